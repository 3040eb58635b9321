use serde::{Deserialize, Serialize};

/// Number of controllable arm joints, gripper included.
pub const JOINT_COUNT: usize = 6;

/// Neutral pulse position for every joint.
pub const JOINT_HOME_PULSE: f64 = 500.0;

/// Valid pulse range for any joint.
pub const JOINT_PULSE_MIN: f64 = 0.0;
pub const JOINT_PULSE_MAX: f64 = 1000.0;

/// Which command family the operator is currently driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    Manual,
    Arm,
}

impl ControlMode {
    pub fn toggled(self) -> Self {
        match self {
            ControlMode::Manual => ControlMode::Arm,
            ControlMode::Arm => ControlMode::Manual,
        }
    }
}

/// Actuation state owned exclusively by the controller.
///
/// `emergency_stop = true` is dominant: speed is forced to 0 and every
/// outbound movement command collapses to an explicit stop until the
/// operator releases it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuationState {
    pub speed_percent: u8,
    pub mode: ControlMode,
    pub emergency_stop: bool,
    pub safety_override: bool,
    pub joint_targets: [f64; JOINT_COUNT],
}

impl ActuationState {
    pub fn new() -> Self {
        Self {
            speed_percent: 50,
            mode: ControlMode::Manual,
            emergency_stop: false,
            safety_override: false,
            joint_targets: [JOINT_HOME_PULSE; JOINT_COUNT],
        }
    }

    /// Effective speed scale, with the emergency-stop invariant applied.
    pub fn speed_scale(&self) -> f64 {
        if self.emergency_stop {
            0.0
        } else {
            f64::from(self.speed_percent) / 100.0
        }
    }
}

impl Default for ActuationState {
    fn default() -> Self {
        Self::new()
    }
}
