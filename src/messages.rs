// Define message types for the bus side of the bridge

use serde::{Deserialize, Serialize};

use crate::serial::{Command, SerialError, Status};

/// Acknowledgment published for every received command
pub const ACK_PAYLOAD: &str = "ack";

/// JSON body of the ack topic
pub fn ack_message() -> serde_json::Result<String> {
    serde_json::to_string(ACK_PAYLOAD)
}

// Command from teleop/planners -> bridge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VelocityCommand {
    pub linear: f64,
    pub angular: f64,
}

impl From<&VelocityCommand> for Command {
    fn from(cmd: &VelocityCommand) -> Self {
        Command::new(cmd.linear, cmd.angular)
    }
}

// Device status republished by the bridge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Odometry {
    pub seq: u64,
    /// Milliseconds since the Unix epoch
    pub stamp_ms: u64,
    pub status: Status,
}

/// Health of the serial link, published after every command cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LinkHealth {
    Ok,
    CmdStale,
    ReadTimeout,
    MalformedReply,
    Disconnected,
}

impl From<&SerialError> for LinkHealth {
    fn from(err: &SerialError) -> Self {
        match err {
            SerialError::ReadTimeout { .. } => LinkHealth::ReadTimeout,
            SerialError::Protocol(_) => LinkHealth::MalformedReply,
            SerialError::Connection { .. }
            | SerialError::HandshakeTimeout { .. }
            | SerialError::Io(_) => LinkHealth::Disconnected,
        }
    }
}
