// Scripted in-memory port for tests

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::frame::TERMINATOR;
use super::link::{LinkSettings, Port};

/// Short timeouts so failing paths finish quickly
pub(crate) fn fast_settings() -> LinkSettings {
    LinkSettings {
        read_timeout: Duration::from_millis(50),
        handshake_timeout: Duration::from_millis(50),
        idle_gap: Duration::from_millis(25),
        ..LinkSettings::new("mock")
    }
}

#[derive(Default)]
struct State {
    written: Vec<u8>,
    /// One script per request frame, each a list of (delay, chunk)
    scripts: VecDeque<Vec<(Duration, Vec<u8>)>>,
    scheduled: VecDeque<(Instant, Vec<u8>)>,
    rx: VecDeque<u8>,
    disconnected: bool,
}

impl State {
    fn deliver_due(&mut self) {
        let now = Instant::now();
        while let Some((at, _)) = self.scheduled.front() {
            if *at > now {
                break;
            }
            if let Some((_, chunk)) = self.scheduled.pop_front() {
                self.rx.extend(chunk);
            }
        }
    }
}

/// Device double. Clones share the same state.
#[derive(Clone, Default)]
pub(crate) struct MockPort {
    state: Arc<Mutex<State>>,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next request with `bytes` at once
    pub fn reply(&self, bytes: &[u8]) {
        self.reply_chunks(vec![(Duration::ZERO, bytes.to_vec())]);
    }

    /// Answer the next request with chunks, each delayed from the write
    pub fn reply_chunks(&self, chunks: Vec<(Duration, Vec<u8>)>) {
        self.state.lock().unwrap().scripts.push_back(chunks);
    }

    /// Put bytes in the receive buffer right now
    pub fn inject(&self, bytes: &[u8]) {
        self.state.lock().unwrap().rx.extend(bytes.iter().copied());
    }

    /// Make every following read and write fail
    pub fn disconnect(&self) {
        self.state.lock().unwrap().disconnected = true;
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().unwrap().written.clone()
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged")
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.disconnected {
            return Err(broken_pipe());
        }
        state.deliver_due();
        if state.rx.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.disconnected {
            return Err(broken_pipe());
        }
        state.written.extend_from_slice(buf);

        // Every terminated request consumes one script
        let frames = buf.iter().filter(|&&b| b == TERMINATOR).count();
        let now = Instant::now();
        for _ in 0..frames {
            if let Some(script) = state.scripts.pop_front() {
                for (delay, chunk) in script {
                    state.scheduled.push_back((now + delay, chunk));
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.disconnected {
            return Err(broken_pipe());
        }
        state.deliver_due();
        Ok(state.rx.len())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.deliver_due();
        state.rx.clear();
        Ok(())
    }
}
