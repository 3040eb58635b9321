//! Topic and service names this core produces and consumes. The names
//! are stable; payload schemas are the remote side's concern.

pub const CMD_VEL_TOPIC: &str = "cmd_vel";
pub const SERVO_CONTROLLER_TOPIC: &str = "servo_controller";
pub const EXECUTE_ACTION_TOPIC: &str = "execute_action";
pub const SAFETY_OVERRIDE_TOPIC: &str = "safety_override";
pub const OBSTACLE_WARNING_TOPIC: &str = "obstacle_warning";

pub const LIST_ACTIONS_SERVICE: &str = "list_available_actions";
pub const CLEAR_QUEUE_SERVICE: &str = "slam_toolbox/clear_queue";
