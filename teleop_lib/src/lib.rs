//! # Teleop Library
//!
//! Shared types and utilities for the teleoperation client core.
//! This library is used by the bus client and the control loop crates.

pub mod types;
pub mod utils;

// Re-export everything for convenience
pub use types::*;
pub use utils::*;
