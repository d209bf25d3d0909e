use clap::Parser;
use tracing_subscriber::EnvFilter;

use serial_odom_bridge::config::BridgeArgs;

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = BridgeArgs::parse();
    if let Err(e) = serial_odom_bridge::runtime::run(args).await {
        eprintln!("Bridge error: {}", e);
        std::process::exit(1);
    }
}
