// Serial protocol core for the motor controller
//
// Provides:
// - Text framing of velocity commands and status replies
// - A bounded-wait serial link with startup handshake
// - The request/response protocol driver

mod driver;
pub mod error;
pub mod frame;
pub mod link;
pub mod status;

#[cfg(test)]
pub(crate) mod mock;

pub use driver::ProtocolDriver;
pub use error::{ProtocolError, SerialError};
pub use frame::{Command, STOP_FRAME, decode_status, encode_command};
pub use link::{LinkSettings, Port, SerialLink};
pub use status::Status;
