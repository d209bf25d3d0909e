// Link probe: open the device, send a few commands, print the decoded status
//
// Usage: cargo run --example link_probe -- [port] [linear] [angular]
// Example: cargo run --example link_probe -- /dev/ttyACM0 0.10 0.00
//
// The last step always sends a stop, and dropping the driver sends another.

use serial_odom_bridge::config::SERIAL_PORT;
use serial_odom_bridge::serial::status::FIELD_NAMES;
use serial_odom_bridge::serial::{LinkSettings, ProtocolDriver, SerialError};
use std::thread::sleep;
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    // Get port and command from args or use defaults
    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| SERIAL_PORT.to_string());
    let linear: f64 = args.next().map(|s| s.parse::<f64>()).transpose()?.unwrap_or(0.0);
    let angular: f64 = args.next().map(|s| s.parse::<f64>()).transpose()?.unwrap_or(0.0);

    println!("Serial port: {}", port);
    println!("Command:     linear={:.2} angular={:.2}", linear, angular);
    println!();

    println!("Step 1: Opening serial port and waiting for handshake...");
    let mut driver = match ProtocolDriver::open(LinkSettings::new(&port)) {
        Ok(driver) => {
            println!("  ✓ Device answered the handshake");
            driver
        }
        Err(e) => {
            println!("  ✗ {}", e);
            println!();
            println!("Troubleshooting:");
            match e {
                SerialError::Connection { .. } => {
                    println!("  - Check the port path is correct");
                    println!("  - Verify the USB cable is connected");
                    println!("  - Check you are in the dialout group (Linux)");
                }
                SerialError::HandshakeTimeout { .. } => {
                    println!("  - The port opened but the firmware never answered '0,0/'");
                    println!("  - Check the board is flashed and the baud rate matches");
                }
                _ => {}
            }
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Sending 5 commands...");
    for i in 0..5 {
        let started = Instant::now();
        match driver.send_command(linear, angular) {
            Ok(status) => {
                println!("  [{}] reply in {:?}", i, started.elapsed());
                for (name, value) in FIELD_NAMES.iter().zip(status.as_array()) {
                    println!("      {:<16} {}", name, value);
                }
            }
            Err(e) => println!("  [{}] ✗ {} (after {:?})", i, e, started.elapsed()),
        }
        sleep(Duration::from_millis(100));
    }
    println!();

    println!("Step 3: Stopping...");
    match driver.stop() {
        Ok(()) => println!("  ✓ Stopped"),
        Err(e) => println!("  ✗ {}", e),
    }

    Ok(())
}
