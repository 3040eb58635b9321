//! Physical gamepad source, fed by device events from the platform
//! layer. Applies the same deadzone transform as the gesture stick and
//! tracks per-button press state with edge detection.

use std::collections::HashMap;
use std::time::Instant;
use teleop_lib::{normalize_axes, GamepadAxis, GamepadButton, InputVector};
use tracing::info;

pub struct GamepadSource {
    deadzone: f64,
    connected: bool,
    // Raw stick values, deadzone applied per-pair on read
    left_x: f64,
    left_y: f64,
    right_x: f64,
    right_y: f64,
    buttons: HashMap<GamepadButton, bool>,
    last_update: Instant,
}

impl GamepadSource {
    pub fn new(deadzone: f64) -> Self {
        Self {
            deadzone,
            connected: false,
            left_x: 0.0,
            left_y: 0.0,
            right_x: 0.0,
            right_y: 0.0,
            buttons: HashMap::new(),
            last_update: Instant::now(),
        }
    }

    /// Hot-plug signal from the platform layer.
    pub fn set_connected(&mut self, connected: bool) {
        if connected != self.connected {
            info!(
                "Gamepad {}",
                if connected { "connected" } else { "disconnected" }
            );
        }
        self.connected = connected;
        if !connected {
            // A vanished device must not leave a stuck stick behind
            self.left_x = 0.0;
            self.left_y = 0.0;
            self.right_x = 0.0;
            self.right_y = 0.0;
            self.buttons.clear();
        }
        self.last_update = Instant::now();
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    pub fn handle_axis(&mut self, axis: GamepadAxis, value: f64) {
        let value = if value.is_finite() {
            value.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        match axis {
            GamepadAxis::LeftStickX => self.left_x = value,
            GamepadAxis::LeftStickY => self.left_y = value,
            GamepadAxis::RightStickX => self.right_x = value,
            GamepadAxis::RightStickY => self.right_y = value,
        }
        self.last_update = Instant::now();
    }

    /// Record a button state change. Returns true exactly on the
    /// released-to-pressed edge, which is what triggers an action.
    pub fn handle_button(&mut self, button: GamepadButton, pressed: bool) -> bool {
        let was_pressed = self.buttons.insert(button, pressed).unwrap_or(false);
        self.last_update = Instant::now();
        pressed && !was_pressed
    }

    pub fn is_pressed(&self, button: GamepadButton) -> bool {
        self.buttons.get(&button).copied().unwrap_or(false)
    }

    /// Current control vector. Left stick drives movement (stick-up is
    /// negative y, so forward inverts it), right stick drives rotation
    /// and the arm axes.
    pub fn vector(&self) -> InputVector {
        let (lx, ly) = normalize_axes(self.left_x, self.left_y, self.deadzone);
        let (rx, ry) = normalize_axes(self.right_x, self.right_y, self.deadzone);
        InputVector {
            forward: -ly,
            strafe: lx,
            rotation: rx,
            arm_x: rx,
            arm_y: ry,
        }
    }
}
