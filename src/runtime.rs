// Zenoh side of the bridge: cmd_vel in, odometry/ack/health out
//
// The serial device is half-duplex, so a dedicated thread owns the driver and
// takes commands one at a time from a bounded queue. A full queue rejects new
// commands instead of interleaving frames on the wire. An urgent stop skips
// everything queued before it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

// local imports
use crate::config::{BridgeArgs, QUEUE_DEPTH, WATCHDOG_HZ};
use crate::messages::{LinkHealth, Odometry, VelocityCommand, ack_message};
use crate::serial::{Command, Port, ProtocolDriver, SerialError, Status};

/// Result of one command cycle on the device thread
#[derive(Debug)]
pub struct Outcome {
    pub command: Command,
    pub result: Result<Status, SerialError>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SubmitError {
    #[error("Command queue is full, command rejected")]
    Busy,

    #[error("Device thread has stopped")]
    Closed,
}

/// Queue entry. Entries from an older epoch were overtaken by a stop.
#[derive(Debug, Clone, Copy)]
struct Queued {
    command: Command,
    epoch: u64,
}

/// Stop request shared between the handle and the device thread
#[derive(Default)]
struct StopSignal {
    epoch: AtomicU64,
    pending: AtomicBool,
}

/// Sending side of the device queue
#[derive(Clone)]
pub struct DriverHandle {
    tx: mpsc::Sender<Queued>,
    stop: Arc<StopSignal>,
}

impl DriverHandle {
    /// Queue a command without waiting
    pub fn submit(&self, cmd: Command) -> Result<(), SubmitError> {
        let queued = Queued {
            command: cmd,
            epoch: self.stop.epoch.load(Ordering::SeqCst),
        };
        self.tx.try_send(queued).map_err(|e| match e {
            TrySendError::Full(_) => SubmitError::Busy,
            TrySendError::Closed(_) => SubmitError::Closed,
        })
    }

    /// Stop the base ahead of anything already queued
    ///
    /// Queued commands are skipped. If the queue is full, the device thread
    /// sends the stop as soon as the in-flight command finishes.
    pub fn stop_now(&self) -> Result<(), SubmitError> {
        let epoch = self.stop.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let queued = Queued {
            command: Command::default(),
            epoch,
        };
        match self.tx.try_send(queued) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.stop.pending.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(SubmitError::Closed),
        }
    }
}

pub struct DriverWorker {
    pub handle: DriverHandle,
    pub outcomes: mpsc::Receiver<Outcome>,
    pub thread: JoinHandle<()>,
}

/// Move the driver onto its own thread
///
/// `connect` reopens the device after an I/O fault, waiting at least
/// `backoff` between attempts.
pub fn spawn_worker<P, F>(
    driver: ProtocolDriver<P>,
    connect: F,
    backoff: Duration,
) -> std::io::Result<DriverWorker>
where
    P: Port + 'static,
    F: FnMut() -> Result<ProtocolDriver<P>, SerialError> + Send + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(QUEUE_DEPTH);
    let (outcome_tx, outcome_rx) = mpsc::channel(QUEUE_DEPTH);
    let stop = Arc::new(StopSignal::default());

    let thread_stop = stop.clone();
    let thread = thread::Builder::new()
        .name("serial-driver".to_string())
        .spawn(move || device_loop(driver, connect, backoff, thread_stop, cmd_rx, outcome_tx))?;

    Ok(DriverWorker {
        handle: DriverHandle { tx: cmd_tx, stop },
        outcomes: outcome_rx,
        thread,
    })
}

fn device_loop<P, F>(
    driver: ProtocolDriver<P>,
    mut connect: F,
    backoff: Duration,
    stop: Arc<StopSignal>,
    mut commands: mpsc::Receiver<Queued>,
    outcomes: mpsc::Sender<Outcome>,
) where
    P: Port,
    F: FnMut() -> Result<ProtocolDriver<P>, SerialError>,
{
    let mut driver = Some(driver);
    let mut lost_at: Option<Instant> = None;

    'recv: while let Some(queued) = commands.blocking_recv() {
        let mut batch = Vec::with_capacity(2);
        if stop.pending.swap(false, Ordering::SeqCst) {
            // The stop did not fit in the queue; send it before anything else
            batch.push(Command::default());
        }
        if queued.epoch < stop.epoch.load(Ordering::SeqCst) {
            debug!("Skipping {:?}, overtaken by a stop", queued.command);
        } else {
            batch.push(queued.command);
        }

        for command in batch {
            if driver.is_none() {
                if let Some(at) = lost_at {
                    let since = at.elapsed();
                    if since < backoff {
                        thread::sleep(backoff - since);
                    }
                }
                info!("Reconnecting to serial device...");
                match connect() {
                    Ok(d) => {
                        info!("Serial device reconnected");
                        driver = Some(d);
                        lost_at = None;
                    }
                    Err(e) => {
                        lost_at = Some(Instant::now());
                        if outcomes.blocking_send(Outcome { command, result: Err(e) }).is_err() {
                            break 'recv;
                        }
                        continue;
                    }
                }
            }

            let Some(active) = driver.as_mut() else {
                continue;
            };
            let result = active.send_command(command.linear, command.angular);
            if let Err(e) = &result {
                if e.requires_reconnect() {
                    error!("Serial link lost: {}", e);
                    driver = None;
                    lost_at = Some(Instant::now());
                }
            }

            if outcomes.blocking_send(Outcome { command, result }).is_err() {
                break 'recv;
            }
        }
    }
    debug!("Serial driver thread exiting");
}

/// Bus-side bookkeeping: sequence numbers, health, watchdog
pub struct Bridge {
    watchdog: Duration,
    seq: u64,
    last_cmd: Option<Command>,
    cmd_received_at: Instant,
    stop_sent: bool,
    health: LinkHealth,
}

impl Bridge {
    pub fn new(watchdog: Duration) -> Self {
        Self {
            watchdog,
            seq: 0,
            last_cmd: None,
            cmd_received_at: Instant::now(),
            stop_sent: false,
            health: LinkHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn health(&self) -> LinkHealth {
        self.health
    }

    /// Record an incoming command and return what to queue
    pub fn on_command(&mut self, cmd: &VelocityCommand) -> Command {
        info!("Received: {:?}", cmd);
        let command = Command::from(cmd);
        self.last_cmd = Some(command);
        self.cmd_received_at = Instant::now();
        self.stop_sent = false;
        command
    }

    /// Turn a device outcome into an odometry message, updating health
    pub fn on_outcome(&mut self, outcome: Outcome) -> Option<Odometry> {
        match outcome.result {
            Ok(status) => {
                self.health = LinkHealth::Ok;
                self.seq += 1;
                debug!("Received from device: {:?}", status);
                Some(Odometry {
                    seq: self.seq,
                    stamp_ms: now_ms(),
                    status,
                })
            }
            Err(e) => {
                self.health = LinkHealth::from(&e);
                if e.is_recoverable() {
                    warn!("Dropping command {:?}: {}", outcome.command, e);
                } else {
                    error!("Command {:?} failed: {}", outcome.command, e);
                }
                None
            }
        }
    }

    /// Returns a stop command while commands are stale and no stop has been queued
    pub fn check_watchdog(&mut self) -> Option<Command> {
        let cmd_age = self.cmd_received_at.elapsed();
        match self.last_cmd {
            Some(cmd) if cmd_age > self.watchdog && !self.stop_sent => {
                self.health = LinkHealth::CmdStale;
                if cmd.is_stop() {
                    self.stop_sent = true;
                    return None;
                }
                warn!("Command stale ({:?} old), stopping base", cmd_age);
                Some(Command::default())
            }
            _ => None,
        }
    }

    /// The watchdog stop reached the device queue
    pub fn stop_queued(&mut self) {
        self.stop_sent = true;
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

pub async fn run(args: BridgeArgs) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = args.link_settings();
    info!("Opening serial device {}...", settings.path);
    let open_settings = settings.clone();
    let driver = tokio::task::spawn_blocking(move || ProtocolDriver::open(open_settings)).await??;

    let mut worker = spawn_worker(
        driver,
        move || ProtocolDriver::open(settings.clone()),
        args.reconnect_backoff(),
    )?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(args.cmd_topic.clone()).await?;
    let pub_odom = session.declare_publisher(args.odom_topic.clone()).await?;
    let pub_ack = session.declare_publisher(args.ack_topic.clone()).await?;
    let pub_health = session.declare_publisher(args.health_topic.clone()).await?;

    let mut bridge = Bridge::new(args.watchdog());
    let mut tick = interval(Duration::from_millis(1000 / WATCHDOG_HZ));

    info!(
        "Bridge started: {}ms read timeout, {}ms watchdog",
        args.read_timeout_ms, args.watchdog_ms
    );
    info!("Subscribed to: {}", args.cmd_topic);
    info!(
        "Publishing to: {}, {}, {}",
        args.odom_topic, args.ack_topic, args.health_topic
    );

    loop {
        tokio::select! {
            sample = subscriber.recv_async() => {
                let sample = sample?;
                let payload = sample.payload().to_bytes();
                match serde_json::from_slice::<VelocityCommand>(&payload) {
                    Ok(cmd) => {
                        pub_ack.put(ack_message()?).await?;
                        let command = bridge.on_command(&cmd);
                        if let Err(e) = worker.handle.submit(command) {
                            warn!("{}: {:?}", e, command);
                        }
                    }
                    Err(e) => {
                        warn!("Failed to parse command: {}", e);
                    }
                }
            }
            Some(outcome) = worker.outcomes.recv() => {
                if let Some(odom) = bridge.on_outcome(outcome) {
                    pub_odom.put(serde_json::to_string(&odom)?).await?;
                }
                pub_health.put(serde_json::to_string(&bridge.health())?).await?;
            }
            _ = tick.tick() => {
                if bridge.check_watchdog().is_some() {
                    // Not marked as sent on failure, so the next tick retries
                    match worker.handle.stop_now() {
                        Ok(()) => bridge.stop_queued(),
                        Err(e) => warn!("Watchdog stop not queued: {}", e),
                    }
                    pub_health.put(serde_json::to_string(&bridge.health())?).await?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    // Closing the queue ends the device thread, which stops the base on drop
    let DriverWorker { handle, outcomes, thread } = worker;
    drop(handle);
    drop(outcomes);
    if tokio::task::spawn_blocking(move || thread.join()).await?.is_err() {
        error!("Serial driver thread panicked");
    }
    Ok(())
}
