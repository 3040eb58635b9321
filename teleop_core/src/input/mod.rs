pub mod gamepad;
pub mod gesture;

pub use gamepad::GamepadSource;
pub use gesture::GestureSource;
