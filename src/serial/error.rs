// Error taxonomy for the serial link and the text protocol on top of it

use std::time::Duration;

/// Errors raised while encoding commands or decoding device replies
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed reply ({reason}): {:?}", String::from_utf8_lossy(.raw))]
    MalformedReply { reason: String, raw: Vec<u8> },

    #[error("Command not representable on the wire: linear={linear}, angular={angular}")]
    InvalidCommand { linear: f64, angular: f64 },
}

/// Errors raised by the serial link and the protocol driver
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Could not open serial device {path}: {source}")]
    Connection {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Device {path} did not answer the handshake within {waited:?}")]
    HandshakeTimeout { path: String, waited: Duration },

    #[error("No reply from device within {waited:?}")]
    ReadTimeout { waited: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl SerialError {
    /// True when the connection is still usable and the caller may resend or skip
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SerialError::ReadTimeout { .. } | SerialError::Protocol(_)
        )
    }

    /// True when the connection must be dropped and reopened
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, SerialError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, SerialError>;
