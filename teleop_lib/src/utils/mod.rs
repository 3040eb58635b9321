pub mod deadzone;
pub mod tracing;

pub use deadzone::*;
pub use tracing::*;
