// Timeouts, topics, serial configuration
use clap::Parser;
use std::time::Duration;

use crate::serial::LinkSettings;
use crate::serial::link::{
    DEFAULT_BAUDRATE, DEFAULT_HANDSHAKE_TIMEOUT_MS, DEFAULT_IDLE_GAP_MS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_READ_TIMEOUT_MS,
};

// Serial port for the motor controller
pub const SERIAL_PORT: &str = "/dev/ttyACM0";

// Stop the base if commands stop arriving for this long
pub const WATCHDOG_TIMEOUT_MS: u64 = 500;

// Watchdog check frequency
pub const WATCHDOG_HZ: u64 = 20;

// Wait between reconnect attempts after the device drops off
pub const RECONNECT_BACKOFF_MS: u64 = 1000;

// Commands waiting for the device before new ones are rejected
pub const QUEUE_DEPTH: usize = 10;

// Zenoh topics
pub const TOPIC_CMD_VEL: &str = "bridge/cmd_vel"; // velocity commands
pub const TOPIC_ODOM: &str = "bridge/odom"; // device status
pub const TOPIC_ACK: &str = "bridge/ack"; // one ack per received command
pub const TOPIC_HEALTH: &str = "bridge/health"; // link health

/// Bridge between a velocity command topic and a serial motor controller
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct BridgeArgs {
    /// Serial device path
    #[arg(short, long, default_value = SERIAL_PORT)]
    pub port: String,

    #[arg(short, long, default_value_t = DEFAULT_BAUDRATE)]
    pub baud: u32,

    /// Max wait for a reply to each command (ms)
    #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT_MS)]
    pub read_timeout_ms: u64,

    /// Max wait for the startup handshake reply (ms)
    #[arg(long, default_value_t = DEFAULT_HANDSHAKE_TIMEOUT_MS)]
    pub handshake_timeout_ms: u64,

    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Quiet time that ends an unterminated reply (ms)
    #[arg(long, default_value_t = DEFAULT_IDLE_GAP_MS)]
    pub idle_gap_ms: u64,

    #[arg(long, default_value_t = WATCHDOG_TIMEOUT_MS)]
    pub watchdog_ms: u64,

    #[arg(long, default_value_t = RECONNECT_BACKOFF_MS)]
    pub reconnect_backoff_ms: u64,

    #[arg(long, default_value = TOPIC_CMD_VEL)]
    pub cmd_topic: String,

    #[arg(long, default_value = TOPIC_ODOM)]
    pub odom_topic: String,

    #[arg(long, default_value = TOPIC_ACK)]
    pub ack_topic: String,

    #[arg(long, default_value = TOPIC_HEALTH)]
    pub health_topic: String,
}

impl BridgeArgs {
    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            path: self.port.clone(),
            baud_rate: self.baud,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            idle_gap: Duration::from_millis(self.idle_gap_ms),
        }
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_millis(self.watchdog_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = BridgeArgs::parse_from(["serial-odom-bridge"]);
        assert_eq!(args.port, SERIAL_PORT);
        assert_eq!(args.cmd_topic, TOPIC_CMD_VEL);

        let settings = args.link_settings();
        assert_eq!(settings.baud_rate, DEFAULT_BAUDRATE);
        assert_eq!(
            settings.read_timeout,
            Duration::from_millis(DEFAULT_READ_TIMEOUT_MS)
        );
        assert_eq!(args.watchdog(), Duration::from_millis(WATCHDOG_TIMEOUT_MS));
    }

    #[test]
    fn test_overrides() {
        let args = BridgeArgs::parse_from([
            "serial-odom-bridge",
            "--port",
            "/dev/ttyUSB1",
            "--baud",
            "115200",
            "--read-timeout-ms",
            "75",
        ]);
        let settings = args.link_settings();
        assert_eq!(settings.path, "/dev/ttyUSB1");
        assert_eq!(settings.baud_rate, 115200);
        assert_eq!(settings.read_timeout, Duration::from_millis(75));
    }
}
