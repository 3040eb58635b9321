//! Fixed-rate actuation controller.
//!
//! Consumes the arbitrated input vector plus mode/speed/safety state
//! and turns it into velocity or joint commands. Every outbound command
//! passes the same gate: it must differ from the last transmitted
//! command of its kind AND the per-kind throttle interval must have
//! elapsed. Both conditions are necessary; dedup alone would freeze a
//! terminal stop, throttle alone would flood the bus.

use std::time::{Duration, Instant};
use teleop_lib::{
    ActuationCommand, ActuationState, ButtonAction, ControlConfig, ControlMode, InputVector,
    JointCommand, JointPulse, VelocityCommand, Vector3, JOINT_COUNT, JOINT_HOME_PULSE,
    JOINT_PULSE_MAX, JOINT_PULSE_MIN,
};
use tracing::{debug, info, warn};

// Joint layout, base to gripper
const BASE: usize = 0;
const SHOULDER: usize = 1;
const ELBOW: usize = 2;
const WRIST_PITCH: usize = 3;
const WRIST_ROLL: usize = 4;
const GRIPPER: usize = 5;

// Reach interpolation endpoints in pulse units (retracted -> extended)
const SHOULDER_RETRACTED: f64 = 500.0;
const SHOULDER_EXTENDED: f64 = 220.0;
const ELBOW_RETRACTED: f64 = 500.0;
const ELBOW_EXTENDED: f64 = 820.0;
const WRIST_PITCH_RETRACTED: f64 = 500.0;
const WRIST_PITCH_EXTENDED: f64 = 730.0;

// X-axis rotation gains, pulses per tick at full deflection
const BASE_ROTATION_GAIN: f64 = 8.0;
const WRIST_ROTATION_GAIN: f64 = 3.0;

const GRIPPER_OPEN_PULSE: f64 = 700.0;
const GRIPPER_CLOSED_PULSE: f64 = 280.0;
const WRIST_NUDGE_STEP: f64 = 25.0;

const JOINT_COMMAND_DURATION_MS: u32 = 100;

/// Below this, drive input counts as idle and collapses to a stop.
const IDLE_EPSILON: f64 = 1e-3;

/// Side effects a button action asks the owner to perform on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEffect {
    PublishSafetyOverride(bool),
    ClearSlamQueue,
}

pub struct ActuationController {
    state: ActuationState,
    movement_throttle: Duration,
    arm_throttle: Duration,
    smoothing_factor: f64,
    speed_step: u8,
    /// Smoothed joint positions converging toward the targets.
    smoothed: [f64; JOINT_COUNT],
    last_velocity: Option<VelocityCommand>,
    last_velocity_at: Option<Instant>,
    last_joint: Option<JointCommand>,
    last_joint_at: Option<Instant>,
    obstacle_warning: bool,
}

impl ActuationController {
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            state: ActuationState::new(),
            movement_throttle: Duration::from_millis(config.movement_throttle_ms),
            arm_throttle: Duration::from_millis(config.arm_throttle_ms),
            smoothing_factor: config.smoothing_factor,
            speed_step: config.speed_step,
            smoothed: [JOINT_HOME_PULSE; JOINT_COUNT],
            last_velocity: None,
            last_velocity_at: None,
            last_joint: None,
            last_joint_at: None,
            obstacle_warning: false,
        }
    }

    pub fn state(&self) -> &ActuationState {
        &self.state
    }

    pub fn set_obstacle_warning(&mut self, warning: bool) {
        if warning != self.obstacle_warning {
            debug!("Obstacle warning: {}", warning);
        }
        self.obstacle_warning = warning;
    }

    /// One control-loop tick. Never fails: malformed input is
    /// neutralized, not propagated, because a partial read must never
    /// escalate into lost control.
    pub fn tick(&mut self, input: &InputVector, now: Instant) -> Vec<ActuationCommand> {
        let input = input.sanitized();
        let mut out = Vec::new();

        // Emergency stop dominates everything else this tick
        if self.state.emergency_stop {
            if let Some(cmd) = self.gate_velocity(VelocityCommand::stop(), now) {
                out.push(ActuationCommand::Velocity(cmd));
            }
            return out;
        }

        match self.state.mode {
            ControlMode::Manual => {
                let cmd = self.manual_velocity(&input);
                if let Some(cmd) = self.gate_velocity(cmd, now) {
                    out.push(ActuationCommand::Velocity(cmd));
                }
            }
            ControlMode::Arm => {
                // The rover must not keep driving on its last velocity
                // while the operator works the arm
                if let Some(cmd) = self.gate_velocity(VelocityCommand::stop(), now) {
                    out.push(ActuationCommand::Velocity(cmd));
                }

                self.update_arm_targets(&input);
                self.smooth_joints();
                let cmd = self.joint_command();
                if let Some(cmd) = self.gate_joint(cmd, now) {
                    out.push(ActuationCommand::Joints(cmd));
                }
            }
        }

        out
    }

    /// Apply one discrete button action, returning the bus side effects
    /// the owner should perform.
    pub fn apply_action(&mut self, action: ButtonAction) -> Vec<ControlEffect> {
        let mut effects = Vec::new();
        match action {
            ButtonAction::EmergencyStopToggle => {
                self.state.emergency_stop = !self.state.emergency_stop;
                if self.state.emergency_stop {
                    warn!("EMERGENCY STOP engaged");
                    self.state.speed_percent = 0;
                } else {
                    info!("Emergency stop released; speed stays at 0 until raised");
                }
            }
            ButtonAction::SpeedUp | ButtonAction::SpeedDown => {
                if self.state.emergency_stop {
                    debug!("Speed change ignored while emergency stop is engaged");
                } else {
                    let step = i16::from(self.speed_step);
                    let delta = if action == ButtonAction::SpeedUp {
                        step
                    } else {
                        -step
                    };
                    let speed = i16::from(self.state.speed_percent) + delta;
                    self.state.speed_percent = speed.clamp(0, 100) as u8;
                    info!("Speed set to {}%", self.state.speed_percent);
                }
            }
            ButtonAction::ArmModeToggle => {
                self.state.mode = self.state.mode.toggled();
                info!("Control mode: {:?}", self.state.mode);
            }
            ButtonAction::SafetyOverrideToggle => {
                self.state.safety_override = !self.state.safety_override;
                if self.state.safety_override {
                    warn!("Safety override ENABLED");
                } else {
                    info!("Safety override disabled");
                }
                effects.push(ControlEffect::PublishSafetyOverride(
                    self.state.safety_override,
                ));
            }
            ButtonAction::GripperOpen => {
                self.state.joint_targets[GRIPPER] = GRIPPER_OPEN_PULSE;
            }
            ButtonAction::GripperClose => {
                self.state.joint_targets[GRIPPER] = GRIPPER_CLOSED_PULSE;
            }
            ButtonAction::WristRotateLeft => {
                self.nudge_joint(WRIST_ROLL, -WRIST_NUDGE_STEP);
            }
            ButtonAction::WristRotateRight => {
                self.nudge_joint(WRIST_ROLL, WRIST_NUDGE_STEP);
            }
            ButtonAction::ResetHome => {
                info!("Re-homing arm and clearing mapper queue");
                self.state.joint_targets = [JOINT_HOME_PULSE; JOINT_COUNT];
                effects.push(ControlEffect::ClearSlamQueue);
            }
            ButtonAction::NoOp => {}
        }
        effects
    }

    fn manual_velocity(&self, input: &InputVector) -> VelocityCommand {
        let scale = self.state.speed_scale();
        let mut forward = input.forward * scale;
        let strafe = input.strafe * scale;
        let rotation = input.rotation * scale;

        // An active obstacle warning blocks advancing; reversing and
        // turning away stay available. The operator can override.
        if forward > 0.0 && self.obstacle_warning && !self.state.safety_override {
            forward = 0.0;
        }

        if forward.abs() < IDLE_EPSILON
            && strafe.abs() < IDLE_EPSILON
            && rotation.abs() < IDLE_EPSILON
        {
            // Idle collapses to one explicit terminal stop, not silence
            // and not a stream of near-zero commands
            VelocityCommand::stop()
        } else {
            VelocityCommand::new(
                Vector3::new(forward, strafe, 0.0),
                Vector3::new(0.0, 0.0, rotation),
            )
        }
    }

    fn update_arm_targets(&mut self, input: &InputVector) {
        // Y axis, inverted and remapped to [0, 1], sweeps the reach
        // joints between their retracted and extended endpoints
        let t = ((-input.arm_y).clamp(-1.0, 1.0) + 1.0) / 2.0;
        self.state.joint_targets[SHOULDER] = lerp(SHOULDER_RETRACTED, SHOULDER_EXTENDED, t);
        self.state.joint_targets[ELBOW] = lerp(ELBOW_RETRACTED, ELBOW_EXTENDED, t);
        self.state.joint_targets[WRIST_PITCH] =
            lerp(WRIST_PITCH_RETRACTED, WRIST_PITCH_EXTENDED, t);

        // X axis rotates base coarsely and wrist finely
        self.nudge_joint(BASE, input.arm_x * BASE_ROTATION_GAIN);
        self.nudge_joint(WRIST_ROLL, input.arm_x * WRIST_ROTATION_GAIN);
    }

    /// First-order exponential smoothing toward the targets. Runs every
    /// tick even with unchanged input, so the arm keeps converging
    /// after the operator releases the stick.
    fn smooth_joints(&mut self) {
        for i in 0..JOINT_COUNT {
            self.smoothed[i] +=
                (self.state.joint_targets[i] - self.smoothed[i]) * self.smoothing_factor;
        }
    }

    fn joint_command(&self) -> JointCommand {
        let joints = self
            .smoothed
            .iter()
            .enumerate()
            .map(|(i, &pulse)| JointPulse {
                id: (i + 1) as u8,
                position: pulse.round().clamp(JOINT_PULSE_MIN, JOINT_PULSE_MAX) as u16,
            })
            .collect();
        JointCommand::new(JOINT_COMMAND_DURATION_MS, joints)
    }

    fn nudge_joint(&mut self, index: usize, delta: f64) {
        self.state.joint_targets[index] =
            (self.state.joint_targets[index] + delta).clamp(JOINT_PULSE_MIN, JOINT_PULSE_MAX);
    }

    fn gate_velocity(&mut self, cmd: VelocityCommand, now: Instant) -> Option<VelocityCommand> {
        if self.last_velocity == Some(cmd) {
            return None;
        }
        if let Some(at) = self.last_velocity_at {
            if now.duration_since(at) < self.movement_throttle {
                return None;
            }
        }
        self.last_velocity = Some(cmd);
        self.last_velocity_at = Some(now);
        Some(cmd)
    }

    fn gate_joint(&mut self, cmd: JointCommand, now: Instant) -> Option<JointCommand> {
        if self.last_joint.as_ref() == Some(&cmd) {
            return None;
        }
        if let Some(at) = self.last_joint_at {
            if now.duration_since(at) < self.arm_throttle {
                return None;
            }
        }
        self.last_joint = Some(cmd.clone());
        self.last_joint_at = Some(now);
        Some(cmd)
    }
}

fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> ActuationController {
        ActuationController::new(&ControlConfig::default())
    }

    fn forward(value: f64) -> InputVector {
        InputVector {
            forward: value,
            ..InputVector::zero()
        }
    }

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    fn velocity(commands: &[ActuationCommand]) -> VelocityCommand {
        match commands.first() {
            Some(ActuationCommand::Velocity(cmd)) => *cmd,
            other => panic!("expected velocity command, got {:?}", other),
        }
    }

    #[test]
    fn test_manual_speed_scaling() {
        // speed=50, forward=1.0 -> linear=(0.5,0,0), angular=(0,0,0)
        let mut ctrl = controller();
        let t0 = Instant::now();

        let out = ctrl.tick(&forward(1.0), t0);
        let cmd = velocity(&out);
        assert!((cmd.linear.x - 0.5).abs() < 1e-9);
        assert_eq!(cmd.linear.y, 0.0);
        assert_eq!(cmd.angular.z, 0.0);
    }

    #[test]
    fn test_idle_produces_exactly_one_stop() {
        let mut ctrl = controller();
        let t0 = Instant::now();

        assert_eq!(ctrl.tick(&forward(1.0), t0).len(), 1);

        // Input drops to zero: one terminal stop
        let out = ctrl.tick(&InputVector::zero(), at(t0, 100));
        assert!(velocity(&out).is_stop());

        // Continued idling publishes nothing further
        for i in 2..20 {
            assert!(ctrl.tick(&InputVector::zero(), at(t0, i * 100)).is_empty());
        }
    }

    #[test]
    fn test_emergency_stop_dominates_all_input() {
        let mut ctrl = controller();
        let t0 = Instant::now();
        ctrl.apply_action(ButtonAction::EmergencyStopToggle);
        assert!(ctrl.state().emergency_stop);
        assert_eq!(ctrl.state().speed_percent, 0);

        let out = ctrl.tick(&forward(1.0), t0);
        assert!(velocity(&out).is_stop());

        // Only the one stop goes out, regardless of further input
        assert!(ctrl.tick(&forward(1.0), at(t0, 100)).is_empty());
        let mut spun = InputVector::zero();
        spun.rotation = -1.0;
        assert!(ctrl.tick(&spun, at(t0, 200)).is_empty());
    }

    #[test]
    fn test_speed_changes_ignored_during_emergency_stop() {
        let mut ctrl = controller();
        ctrl.apply_action(ButtonAction::EmergencyStopToggle);
        ctrl.apply_action(ButtonAction::SpeedUp);
        assert_eq!(ctrl.state().speed_percent, 0);

        ctrl.apply_action(ButtonAction::EmergencyStopToggle);
        ctrl.apply_action(ButtonAction::SpeedUp);
        assert_eq!(ctrl.state().speed_percent, 10);
    }

    #[test]
    fn test_throttle_limits_rate_and_keeps_latest() {
        let mut ctrl = controller();
        let t0 = Instant::now();

        assert_eq!(ctrl.tick(&forward(1.0), t0).len(), 1);

        // Changes inside the 50ms window are suppressed
        assert!(ctrl.tick(&forward(0.9), at(t0, 10)).is_empty());
        assert!(ctrl.tick(&forward(0.8), at(t0, 20)).is_empty());

        // Once the window passes, the most recent input goes out
        let out = ctrl.tick(&forward(0.8), at(t0, 60));
        assert!((velocity(&out).linear.x - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_dedup_blocks_repeats_after_throttle_elapsed() {
        let mut ctrl = controller();
        let t0 = Instant::now();

        assert_eq!(ctrl.tick(&forward(1.0), t0).len(), 1);
        // Same command, throttle long since elapsed: still no repeat
        assert!(ctrl.tick(&forward(1.0), at(t0, 500)).is_empty());
        assert!(ctrl.tick(&forward(1.0), at(t0, 1000)).is_empty());
    }

    #[test]
    fn test_arm_mode_convergence_to_extended_endpoint() {
        let mut ctrl = controller();
        let t0 = Instant::now();
        ctrl.apply_action(ButtonAction::ArmModeToggle);
        assert_eq!(ctrl.state().mode, ControlMode::Arm);

        // Full "down" on the arm axis: interpolation factor 1.0
        let mut input = InputVector::zero();
        input.arm_y = -1.0;

        // First arm tick also emits the terminal drive stop
        let out = ctrl.tick(&input, t0);
        assert!(out
            .iter()
            .any(|c| matches!(c, ActuationCommand::Velocity(v) if v.is_stop())));

        assert!((ctrl.state().joint_targets[SHOULDER] - SHOULDER_EXTENDED).abs() < 1e-9);

        // Smoothing keeps converging tick after tick
        let mut last_position = None;
        for i in 1..200 {
            let out = ctrl.tick(&input, at(t0, i * 100));
            if let Some(ActuationCommand::Joints(cmd)) = out
                .iter()
                .find(|c| matches!(c, ActuationCommand::Joints(_)))
            {
                last_position = Some(cmd.joints[SHOULDER].position);
            }
        }
        assert_eq!(last_position, Some(SHOULDER_EXTENDED as u16));
    }

    #[test]
    fn test_arm_joint_dedup_after_convergence() {
        let mut ctrl = controller();
        let t0 = Instant::now();
        ctrl.apply_action(ButtonAction::ArmModeToggle);
        let input = InputVector::zero();

        for i in 0..200 {
            ctrl.tick(&input, at(t0, i * 100));
        }
        // Fully converged: rounded positions stopped changing, so the
        // dedup gate goes quiet even though the throttle has elapsed
        assert!(ctrl.tick(&input, at(t0, 100_000)).is_empty());
    }

    #[test]
    fn test_obstacle_warning_blocks_forward_only() {
        let mut ctrl = controller();
        let t0 = Instant::now();
        ctrl.set_obstacle_warning(true);

        // Pure forward collapses to a stop
        let out = ctrl.tick(&forward(1.0), t0);
        assert!(velocity(&out).is_stop());

        // Rotation away from the obstacle still works
        let mut input = forward(1.0);
        input.rotation = 1.0;
        let out = ctrl.tick(&input, at(t0, 100));
        let cmd = velocity(&out);
        assert_eq!(cmd.linear.x, 0.0);
        assert!((cmd.angular.z - 0.5).abs() < 1e-9);

        // Safety override restores forward motion
        ctrl.apply_action(ButtonAction::SafetyOverrideToggle);
        let out = ctrl.tick(&forward(1.0), at(t0, 200));
        assert!((velocity(&out).linear.x - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_reverse_allowed_during_obstacle_warning() {
        let mut ctrl = controller();
        ctrl.set_obstacle_warning(true);
        let out = ctrl.tick(&forward(-1.0), Instant::now());
        assert!((velocity(&out).linear.x - (-0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_speed_clamped_to_percent_range() {
        let mut ctrl = controller();
        for _ in 0..20 {
            ctrl.apply_action(ButtonAction::SpeedUp);
        }
        assert_eq!(ctrl.state().speed_percent, 100);
        for _ in 0..20 {
            ctrl.apply_action(ButtonAction::SpeedDown);
        }
        assert_eq!(ctrl.state().speed_percent, 0);
    }

    #[test]
    fn test_gripper_and_wrist_actions() {
        let mut ctrl = controller();
        ctrl.apply_action(ButtonAction::GripperOpen);
        assert_eq!(ctrl.state().joint_targets[GRIPPER], GRIPPER_OPEN_PULSE);
        ctrl.apply_action(ButtonAction::GripperClose);
        assert_eq!(ctrl.state().joint_targets[GRIPPER], GRIPPER_CLOSED_PULSE);

        let before = ctrl.state().joint_targets[WRIST_ROLL];
        ctrl.apply_action(ButtonAction::WristRotateRight);
        assert_eq!(
            ctrl.state().joint_targets[WRIST_ROLL],
            before + WRIST_NUDGE_STEP
        );
    }

    #[test]
    fn test_reset_home_effect() {
        let mut ctrl = controller();
        ctrl.apply_action(ButtonAction::GripperOpen);
        let effects = ctrl.apply_action(ButtonAction::ResetHome);
        assert_eq!(effects, vec![ControlEffect::ClearSlamQueue]);
        assert_eq!(
            ctrl.state().joint_targets,
            [JOINT_HOME_PULSE; JOINT_COUNT]
        );
    }

    #[test]
    fn test_safety_override_effect() {
        let mut ctrl = controller();
        let effects = ctrl.apply_action(ButtonAction::SafetyOverrideToggle);
        assert_eq!(effects, vec![ControlEffect::PublishSafetyOverride(true)]);
        let effects = ctrl.apply_action(ButtonAction::SafetyOverrideToggle);
        assert_eq!(effects, vec![ControlEffect::PublishSafetyOverride(false)]);
    }

    #[test]
    fn test_malformed_input_is_neutralized() {
        let mut ctrl = controller();
        let input = InputVector {
            forward: f64::NAN,
            strafe: f64::INFINITY,
            rotation: 0.0,
            arm_x: 0.0,
            arm_y: 0.0,
        };
        // Neutralized to idle: one terminal stop, no panic
        let out = ctrl.tick(&input, Instant::now());
        assert!(velocity(&out).is_stop());
    }
}
