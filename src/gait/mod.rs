// Gait control module
//
// Provides:
// - Posture and weight-shift primitives built on the ramp engine
// - The parameterized gait state machine (trot, crawl, in-place turn)
// - The supervisor that owns the single active gait task

pub mod body;
pub mod machine;
mod supervisor;

pub use body::Body;
pub use machine::{Direction, GaitKind, StopSignal, Turn};
pub use supervisor::Supervisor;
