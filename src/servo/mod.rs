// Servo control module for the quadruped
//
// Provides:
// - PCA9685 PWM controller protocol over I2C
// - Logical joint -> channel mapping with per-channel inversion
// - Commanded-angle tracking and the synchronized ramp engine

pub mod channel;
mod driver;
pub mod pca9685;

pub use channel::{ChannelMap, DiagPair, Joint, Leg, MapError, ServoChannel};
pub use driver::ServoDriver;
pub use pca9685::{DryRunBackend, Pca9685, PwmBackend, PwmError};
