use serde::{Deserialize, Serialize};

/// Normalized control vector produced by an input source.
///
/// Every component is expected in `[-1.0, 1.0]` after deadzone
/// normalization. The arbitrator selects between sources but never
/// re-applies the deadzone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputVector {
    pub forward: f64,
    pub strafe: f64,
    pub rotation: f64,
    pub arm_x: f64,
    pub arm_y: f64,
}

impl InputVector {
    pub fn zero() -> Self {
        Self {
            forward: 0.0,
            strafe: 0.0,
            rotation: 0.0,
            arm_x: 0.0,
            arm_y: 0.0,
        }
    }

    /// Neutralize malformed values: non-finite components become 0.0,
    /// everything else is clamped to [-1, 1]. A partial read from an
    /// input device must never escalate into lost control.
    pub fn sanitized(&self) -> Self {
        fn clean(v: f64) -> f64 {
            if v.is_finite() {
                v.clamp(-1.0, 1.0)
            } else {
                0.0
            }
        }

        Self {
            forward: clean(self.forward),
            strafe: clean(self.strafe),
            rotation: clean(self.rotation),
            arm_x: clean(self.arm_x),
            arm_y: clean(self.arm_y),
        }
    }

    /// True when all drive axes are below the idle epsilon.
    pub fn is_drive_idle(&self, epsilon: f64) -> bool {
        self.forward.abs() < epsilon
            && self.strafe.abs() < epsilon
            && self.rotation.abs() < epsilon
    }
}

impl Default for InputVector {
    fn default() -> Self {
        Self::zero()
    }
}

/// Which input source currently owns the command stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveSource {
    Gamepad,
    Gesture,
}

/// Physical gamepad buttons the client recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamepadButton {
    South,
    East,
    West,
    North,
    LeftBumper,
    RightBumper,
    Select,
    Start,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    Unknown,
}

/// Gamepad analog axes consumed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamepadAxis {
    LeftStickX,
    LeftStickY,
    RightStickX,
    RightStickY,
}

/// Closed set of discrete actions a button press can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonAction {
    EmergencyStopToggle,
    ResetHome,
    GripperOpen,
    GripperClose,
    SpeedUp,
    SpeedDown,
    ArmModeToggle,
    SafetyOverrideToggle,
    WristRotateLeft,
    WristRotateRight,
    NoOp,
}
