//! Fuses the two input sources into one authoritative control vector.
//!
//! The priority rule is strict and non-blended: a connected gamepad
//! owns the stream exclusively, otherwise the gesture stick does. The
//! operator must always know unambiguously which device is live.

use crate::input::{GamepadSource, GestureSource};
use teleop_lib::{ActiveSource, ButtonAction, GamepadButton, InputVector};
use tracing::info;

pub struct InputArbitrator {
    active: ActiveSource,
}

impl InputArbitrator {
    pub fn new() -> Self {
        Self {
            active: ActiveSource::Gesture,
        }
    }

    /// The source currently owning the command stream.
    pub fn active_source(&self) -> ActiveSource {
        self.active
    }

    /// Pick the authoritative vector for this tick. Logs whenever the
    /// live source changes.
    pub fn select(
        &mut self,
        gamepad: &GamepadSource,
        gesture: &GestureSource,
    ) -> (InputVector, ActiveSource) {
        let source = if gamepad.is_connected() {
            ActiveSource::Gamepad
        } else {
            ActiveSource::Gesture
        };

        if source != self.active {
            info!("Active input source switched to {:?}", source);
            self.active = source;
        }

        let vector = match source {
            ActiveSource::Gamepad => gamepad.vector(),
            ActiveSource::Gesture => gesture.vector(),
        };
        (vector, source)
    }
}

impl Default for InputArbitrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Static button-to-action table. Pure and stateless; unmapped buttons
/// are a no-op.
pub fn map_button(button: GamepadButton) -> ButtonAction {
    match button {
        GamepadButton::Start => ButtonAction::EmergencyStopToggle,
        GamepadButton::Select => ButtonAction::ResetHome,
        GamepadButton::South => ButtonAction::GripperClose,
        GamepadButton::East => ButtonAction::GripperOpen,
        GamepadButton::North => ButtonAction::ArmModeToggle,
        GamepadButton::West => ButtonAction::SafetyOverrideToggle,
        GamepadButton::DPadUp => ButtonAction::SpeedUp,
        GamepadButton::DPadDown => ButtonAction::SpeedDown,
        GamepadButton::LeftBumper => ButtonAction::WristRotateLeft,
        GamepadButton::RightBumper => ButtonAction::WristRotateRight,
        GamepadButton::DPadLeft | GamepadButton::DPadRight | GamepadButton::Unknown => {
            ButtonAction::NoOp
        }
    }
}
