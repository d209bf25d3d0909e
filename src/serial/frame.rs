// Text framing for the motor controller
//
// Request:  "<linear>,<angular>/"   two fractional digits each
// Reply:    "<f0>,<f1>,...,<f10>"   optionally followed by '/' and/or a line ending

use super::error::ProtocolError;
use super::status::{STATUS_FIELDS, Status};

/// Frame terminator used by requests (and accepted on replies)
pub const TERMINATOR: u8 = b'/';

/// Neutral command sent on startup and on shutdown
pub const STOP_FRAME: &[u8] = b"0,0/";

/// Requested body velocity
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Command {
    pub linear: f64,
    pub angular: f64,
}

impl Command {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }

    pub fn is_stop(&self) -> bool {
        self.linear == 0.0 && self.angular == 0.0
    }
}

/// Encode a command into its wire bytes
pub fn encode_command(cmd: Command) -> Result<Vec<u8>, ProtocolError> {
    if !cmd.linear.is_finite() || !cmd.angular.is_finite() {
        return Err(ProtocolError::InvalidCommand {
            linear: cmd.linear,
            angular: cmd.angular,
        });
    }
    Ok(format!("{:.2},{:.2}/", cmd.linear, cmd.angular).into_bytes())
}

/// Length of the first terminated frame in `buf`, terminator included.
/// A terminator with only whitespace before it does not end a frame.
pub fn frame_len(buf: &[u8]) -> Option<usize> {
    let start = buf.iter().position(|b| !b.is_ascii_whitespace())?;
    buf[start..]
        .iter()
        .position(|&b| b == TERMINATOR || b == b'\n')
        .map(|i| start + i + 1)
}

/// Decode a reply into a Status. Nothing is returned unless all fields parse.
pub fn decode_status(raw: &[u8]) -> Result<Status, ProtocolError> {
    let malformed = |reason: String| ProtocolError::MalformedReply {
        reason,
        raw: raw.to_vec(),
    };

    if !raw.is_ascii() {
        return Err(malformed("non-ASCII bytes in reply".to_string()));
    }
    // ASCII is always valid UTF-8
    let text = std::str::from_utf8(raw).map_err(|e| malformed(e.to_string()))?;
    let body = text.trim_end();
    let body = body.strip_suffix(TERMINATOR as char).unwrap_or(body);

    let tokens: Vec<&str> = body.split(',').collect();
    if tokens.len() != STATUS_FIELDS {
        return Err(malformed(format!(
            "expected {} fields, got {}",
            STATUS_FIELDS,
            tokens.len()
        )));
    }

    let mut fields = [0.0f64; STATUS_FIELDS];
    for (i, token) in tokens.iter().enumerate() {
        let token = token.trim();
        let value: f64 = token
            .parse()
            .map_err(|_| malformed(format!("field {} is not a number: {:?}", i, token)))?;
        if !value.is_finite() {
            return Err(malformed(format!("field {} is not finite: {:?}", i, token)));
        }
        fields[i] = value;
    }

    Ok(Status::from_fields(fields))
}
