//! # Teleop Core
//!
//! Fuses the gesture and gamepad input sources into one authoritative
//! command stream and runs the fixed-rate actuation loop that publishes
//! rate-limited, deduplicated commands through the bus client.

pub mod actions;
pub mod actuation;
pub mod arbitrator;
pub mod control_loop;
pub mod input;

pub use actions::{ActionCatalog, ActionCategory};
pub use actuation::{ActuationController, ControlEffect};
pub use arbitrator::{map_button, InputArbitrator};
pub use input::{GamepadSource, GestureSource};
