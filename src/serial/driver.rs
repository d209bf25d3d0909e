// Request/response driver for the motor controller
//
// Formats a velocity command, writes it through the link, and parses the
// reply into a Status. One command at a time; no retries here.

use tracing::{debug, info, warn};

use super::error::{Result, SerialError};
use super::frame::{self, Command, STOP_FRAME};
use super::link::{LinkSettings, Port, SerialLink};
use super::status::Status;

pub struct ProtocolDriver<P: Port = Box<dyn serialport::SerialPort>> {
    link: SerialLink<P>,
}

impl ProtocolDriver {
    /// Open the serial device, handshake, and return a ready driver
    pub fn open(settings: LinkSettings) -> Result<Self> {
        let link = SerialLink::open(settings)?;
        Ok(Self::new(link))
    }
}

impl<P: Port> ProtocolDriver<P> {
    pub fn new(link: SerialLink<P>) -> Self {
        Self { link }
    }

    pub fn link(&self) -> &SerialLink<P> {
        &self.link
    }

    /// Send a velocity command and wait for the device status
    ///
    /// # Arguments
    /// * `linear` - Forward velocity
    /// * `angular` - Rotational velocity
    ///
    /// Failures are returned as-is: `ReadTimeout` and malformed replies leave
    /// the connection usable, `Io` means it should be reopened.
    pub fn send_command(&mut self, linear: f64, angular: f64) -> Result<Status> {
        debug!("Data to send: {}, {}", linear, angular);
        let request = frame::encode_command(Command::new(linear, angular))?;
        debug!("Sending command: {:?}", String::from_utf8_lossy(&request));

        let reply = self.link.write_then_read(&request)?;
        let status = frame::decode_status(&reply)?;
        debug!("Received from device: {:?}", status);
        Ok(status)
    }

    /// Send the neutral command. The reply is not parsed.
    pub fn stop(&mut self) -> Result<()> {
        info!("Stopping device");
        let reply = self.link.write_then_read(STOP_FRAME)?;
        debug!("Stop acknowledged: {:?}", String::from_utf8_lossy(&reply));
        Ok(())
    }
}

impl<P: Port> Drop for ProtocolDriver<P> {
    fn drop(&mut self) {
        // Best effort: leave the device with zero velocity
        if let Err(e) = self.link.send(STOP_FRAME) {
            match e {
                SerialError::Io(_) => debug!("Stop on drop skipped, link is down: {}", e),
                _ => warn!("Failed to stop device on drop: {}", e),
            }
        }
    }
}
