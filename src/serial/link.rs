// Byte-level transport to the motor controller
//
// The device frames replies by availability, so a reply is read until a
// terminator shows up or the line goes quiet for `idle_gap`. Every wait is
// bounded by a deadline.

use serialport::{self, ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use super::error::{Result, SerialError};
use super::frame::{self, STOP_FRAME};

/// Default serial configuration
pub const DEFAULT_BAUDRATE: u32 = 9600;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 200;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1;
pub const DEFAULT_IDLE_GAP_MS: u64 = 20;

/// Minimal port surface the link needs
pub trait Port: Read + Write + Send {
    /// Number of received bytes waiting to be read
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Drop anything already received
    fn discard_input(&mut self) -> io::Result<()>;
}

impl Port for Box<dyn SerialPort> {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.bytes_to_read()? as usize)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        Ok(self.clear(ClearBuffer::Input)?)
    }
}

/// Connection parameters
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub path: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub handshake_timeout: Duration,
    pub poll_interval: Duration,
    pub idle_gap: Duration,
}

impl LinkSettings {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUDRATE,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            idle_gap: Duration::from_millis(DEFAULT_IDLE_GAP_MS),
        }
    }
}

/// Exclusive owner of the serial connection
pub struct SerialLink<P: Port = Box<dyn SerialPort>> {
    port: P,
    settings: LinkSettings,
}

impl SerialLink {
    /// Open the device and wait for it to answer a stop command
    pub fn open(settings: LinkSettings) -> Result<Self> {
        let port = serialport::new(&settings.path, settings.baud_rate)
            .timeout(settings.poll_interval)
            .open()
            .map_err(|source| SerialError::Connection {
                path: settings.path.clone(),
                source,
            })?;
        info!("Using serial port {} @ {} baud", settings.path, settings.baud_rate);

        let mut link = Self::new(port, settings);
        link.handshake()?;
        Ok(link)
    }
}

impl<P: Port> SerialLink<P> {
    /// Wrap an already opened port. No handshake is performed.
    pub fn new(port: P, settings: LinkSettings) -> Self {
        Self { port, settings }
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn path(&self) -> &str {
        &self.settings.path
    }

    /// Write the stop frame and wait for any reply. The reply is not parsed.
    pub fn handshake(&mut self) -> Result<()> {
        self.port.discard_input()?;
        self.send(STOP_FRAME)?;
        debug!("Waiting for response from {}", self.settings.path);

        match self.read_reply(self.settings.handshake_timeout)? {
            Some(reply) => {
                info!("Init with state: {:?}", String::from_utf8_lossy(&reply));
                Ok(())
            }
            None => Err(SerialError::HandshakeTimeout {
                path: self.settings.path.clone(),
                waited: self.settings.handshake_timeout,
            }),
        }
    }

    /// Write all bytes and flush, without waiting for a reply
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    /// Write a request and block for its reply, at most `read_timeout`
    pub fn write_then_read(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        // A late reply to an earlier request must not be taken for this one
        self.port.discard_input()?;
        self.send(bytes)?;

        self.read_reply(self.settings.read_timeout)?
            .ok_or(SerialError::ReadTimeout {
                waited: self.settings.read_timeout,
            })
    }

    /// Collect one reply. `None` if nothing arrived before the deadline.
    fn read_reply(&mut self, wait: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + wait;
        let mut buf = Vec::new();
        let mut last_byte_at: Option<Instant> = None;

        loop {
            let available = self.port.bytes_available()?;
            if available > 0 {
                let mut chunk = vec![0u8; available];
                match self.port.read(&mut chunk) {
                    Ok(n) => {
                        let mut data = &chunk[..n];
                        // Line endings left over from the previous reply
                        if buf.is_empty() {
                            let skip = data
                                .iter()
                                .position(|b| !b.is_ascii_whitespace())
                                .unwrap_or(data.len());
                            data = &data[skip..];
                        }
                        if !data.is_empty() {
                            buf.extend_from_slice(data);
                            last_byte_at = Some(Instant::now());
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                    Err(e) => return Err(e.into()),
                }
                if let Some(len) = frame::frame_len(&buf) {
                    buf.truncate(len);
                    break;
                }
            }

            let now = Instant::now();
            if let Some(at) = last_byte_at {
                if now.duration_since(at) >= self.settings.idle_gap {
                    trace!("Line idle, taking {} bytes as a frame", buf.len());
                    break;
                }
            }
            if now >= deadline {
                break;
            }
            thread::sleep(self.settings.poll_interval);
        }

        if buf.is_empty() {
            Ok(None)
        } else {
            trace!("Reply: {:?}", String::from_utf8_lossy(&buf));
            Ok(Some(buf))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::mock::{MockPort, fast_settings};

    #[test]
    fn test_handshake_writes_stop_frame() {
        let port = MockPort::new();
        port.reply(b"ready");
        let mut link = SerialLink::new(port.clone(), fast_settings());

        link.handshake().unwrap();
        assert_eq!(port.written(), b"0,0/");
    }

    #[test]
    fn test_handshake_timeout() {
        let port = MockPort::new();
        let mut link = SerialLink::new(port, fast_settings());

        match link.handshake() {
            Err(SerialError::HandshakeTimeout { path, .. }) => assert_eq!(path, "mock"),
            other => panic!("expected handshake timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_read_timeout_is_bounded() {
        let port = MockPort::new();
        let mut link = SerialLink::new(port.clone(), fast_settings());

        let started = Instant::now();
        let result = link.write_then_read(b"1.00,0.00/");
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(SerialError::ReadTimeout { .. })));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(500), "took {:?}", elapsed);
        assert_eq!(port.written(), b"1.00,0.00/");
    }

    #[test]
    fn test_reads_until_terminator_across_chunks() {
        let port = MockPort::new();
        port.reply_chunks(vec![
            (Duration::ZERO, b"1,2,3,4,5,".to_vec()),
            (Duration::from_millis(5), b"6,7,8,9,10,11/".to_vec()),
        ]);
        let mut link = SerialLink::new(port, fast_settings());

        let reply = link.write_then_read(b"0.00,0.00/").unwrap();
        assert_eq!(reply, b"1,2,3,4,5,6,7,8,9,10,11/");
    }

    #[test]
    fn test_late_line_ending_does_not_shadow_next_reply() {
        let port = MockPort::new();
        port.reply_chunks(vec![
            (Duration::ZERO, b"1,0,0,0,0,0,0,0,0,0,0/".to_vec()),
            (Duration::from_millis(3), b"\r\n".to_vec()),
        ]);
        port.reply_chunks(vec![(
            Duration::from_millis(8),
            b"2,0,0,0,0,0,0,0,0,0,0/".to_vec(),
        )]);
        let mut link = SerialLink::new(port, fast_settings());

        assert_eq!(
            link.write_then_read(b"0.10,0.00/").unwrap(),
            b"1,0,0,0,0,0,0,0,0,0,0/"
        );
        assert_eq!(
            link.write_then_read(b"0.20,0.00/").unwrap(),
            b"2,0,0,0,0,0,0,0,0,0,0/"
        );
    }

    #[test]
    fn test_only_line_ending_is_a_timeout() {
        let port = MockPort::new();
        port.reply(b"\r\n");
        let mut link = SerialLink::new(port, fast_settings());

        assert!(matches!(
            link.write_then_read(b"0.10,0.00/"),
            Err(SerialError::ReadTimeout { .. })
        ));
    }

    #[test]
    fn test_reply_is_cut_at_terminator() {
        let port = MockPort::new();
        port.reply(b"1,2,3/\r\n");
        let mut link = SerialLink::new(port, fast_settings());

        assert_eq!(link.write_then_read(b"0.10,0.00/").unwrap(), b"1,2,3/");
    }

    #[test]
    fn test_unterminated_reply_ends_on_idle_line() {
        let port = MockPort::new();
        port.reply(b"0,0,0,0,0,0,0,0,0,0,0");
        let mut link = SerialLink::new(port, fast_settings());

        let reply = link.write_then_read(b"0.00,0.00/").unwrap();
        assert_eq!(reply, b"0,0,0,0,0,0,0,0,0,0,0");
    }

    #[test]
    fn test_stale_input_is_discarded_before_write() {
        let port = MockPort::new();
        port.inject(b"late,reply/");
        port.reply(b"fresh/");
        let mut link = SerialLink::new(port, fast_settings());

        assert_eq!(link.write_then_read(b"0.10,0.00/").unwrap(), b"fresh/");
    }

    #[test]
    fn test_write_fault_is_io_error() {
        let port = MockPort::new();
        port.disconnect();
        let mut link = SerialLink::new(port, fast_settings());

        let err = link.write_then_read(b"0.10,0.00/").unwrap_err();
        assert!(err.requires_reconnect(), "{:?}", err);
    }

    #[test]
    fn test_open_missing_device() {
        let settings = LinkSettings::new("/dev/does-not-exist-serial-odom-bridge");
        match SerialLink::open(settings) {
            Err(SerialError::Connection { path, .. }) => {
                assert_eq!(path, "/dev/does-not-exist-serial-odom-bridge")
            }
            Err(other) => panic!("expected connection error, got {:?}", other),
            Ok(_) => panic!("opened a device that does not exist"),
        }
    }
}
