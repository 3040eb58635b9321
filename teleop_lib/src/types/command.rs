use serde::{Deserialize, Serialize};

/// Plain 3-vector matching the wire layout of a twist component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// Velocity command published to `cmd_vel`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    pub linear: Vector3,
    pub angular: Vector3,
}

impl VelocityCommand {
    pub fn new(linear: Vector3, angular: Vector3) -> Self {
        Self { linear, angular }
    }

    /// Explicit stop: all axes zero.
    pub fn stop() -> Self {
        Self {
            linear: Vector3::zero(),
            angular: Vector3::zero(),
        }
    }

    pub fn is_stop(&self) -> bool {
        *self == Self::stop()
    }
}

/// One servo target in integer pulse units (0..=1000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointPulse {
    pub id: u8,
    pub position: u16,
}

/// Joint position command published to `servo_controller`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointCommand {
    pub duration_ms: u32,
    pub joints: Vec<JointPulse>,
}

impl JointCommand {
    pub fn new(duration_ms: u32, joints: Vec<JointPulse>) -> Self {
        Self { duration_ms, joints }
    }
}

/// A command the actuation controller wants transmitted this tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ActuationCommand {
    Velocity(VelocityCommand),
    Joints(JointCommand),
}
