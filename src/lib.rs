pub mod config;
pub mod gait;
pub mod messages;
pub mod runtime;
pub mod servo;
