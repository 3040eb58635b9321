pub mod actuation;
pub mod command;
pub mod config;
pub mod input;
pub mod topics;

pub use actuation::*;
pub use command::*;
pub use config::*;
pub use input::*;
pub use topics::*;
