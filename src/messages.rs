// Wire message types for the runtime

use serde::{Deserialize, Serialize};

use crate::gait::GaitKind;

/// Command verb from teleop/scripts -> runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MotionCommand {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
    Neutral,
}

/// Reply published after every dispatched command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAck {
    pub command: MotionCommand,
    pub status: String,
}

/// Periodic state report: which gait (if any) is driving the servos
#[derive(Debug, Clone, Serialize)]
pub struct ControllerState {
    pub gait: Option<GaitKind>,
}
