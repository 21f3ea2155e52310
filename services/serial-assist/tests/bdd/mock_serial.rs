//! Scriptable serial port for session tests
//!
//! Shared by the integration tests and the BDD suite. The factory hands out
//! a reader fed from a channel the test controls and a writer that records
//! every write (and optionally loops it back to the reader).

#![allow(dead_code)]

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serial_assist::io::{SerialPair, SerialPortFactory, SerialReader, SerialWriter};
use serial_assist::{
    EventReceiver, Result, SerialAssistError, SerialConfig, SerialSession, SessionEvent,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// What the device "sends" next
#[derive(Debug)]
pub enum Inbound {
    Data(Vec<u8>),
    Fault(ErrorKind, String),
    Eof,
}

#[derive(Default)]
struct LinkState {
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    writes: Vec<Vec<u8>>,
    opens: usize,
}

// ============================================================================
// Mock Serial Infrastructure
// ============================================================================

struct MockSerialReader {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl SerialReader for MockSerialReader {
    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        match self.inbound.recv().await {
            Some(Inbound::Data(data)) => Ok(Some(data)),
            Some(Inbound::Fault(kind, msg)) => {
                Err(SerialAssistError::Io(std::io::Error::new(kind, msg)))
            }
            Some(Inbound::Eof) | None => Ok(None),
        }
    }
}

struct MockSerialWriter {
    state: Arc<Mutex<LinkState>>,
    loopback: bool,
    fail_writes: Arc<AtomicBool>,
    stall_writes: Arc<AtomicBool>,
}

#[async_trait]
impl SerialWriter for MockSerialWriter {
    async fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if self.stall_writes.load(Ordering::SeqCst) {
            // Like a port whose CTS line is never asserted
            std::future::pending::<()>().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SerialAssistError::Communication(
                "Failed to write: device removed".to_string(),
            ));
        }

        let mut state = self.state.lock().unwrap();
        state.writes.push(data.to_vec());
        if self.loopback {
            if let Some(inbound) = &state.inbound {
                let _ = inbound.send(Inbound::Data(data.to_vec()));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockSerialPortFactory {
    state: Arc<Mutex<LinkState>>,
    loopback: bool,
    fail_writes: Arc<AtomicBool>,
    stall_writes: Arc<AtomicBool>,
}

impl std::fmt::Debug for MockSerialPortFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPortFactory")
            .field("loopback", &self.loopback)
            .field("fail_writes", &self.fail_writes)
            .field("stall_writes", &self.stall_writes)
            .finish_non_exhaustive()
    }
}

impl MockSerialPortFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every written byte is read back, as if TX were wired to RX
    pub fn loopback() -> Self {
        Self {
            loopback: true,
            ..Self::default()
        }
    }

    fn push(&self, item: Inbound) -> bool {
        let state = self.state.lock().unwrap();
        match &state.inbound {
            Some(inbound) => inbound.send(item).is_ok(),
            None => false,
        }
    }

    /// Deliver bytes to the open port. False if no port is open.
    pub fn push_data(&self, data: &[u8]) -> bool {
        self.push(Inbound::Data(data.to_vec()))
    }

    pub fn push_fault(&self, kind: ErrorKind, msg: &str) -> bool {
        self.push(Inbound::Fault(kind, msg.to_string()))
    }

    /// Simulate the device disappearing
    pub fn hang_up(&self) -> bool {
        self.push(Inbound::Eof)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Writes never complete while set
    pub fn set_stall_writes(&self, stall: bool) {
        self.stall_writes.store(stall, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens
    }
}

#[async_trait]
impl SerialPortFactory for MockSerialPortFactory {
    async fn open(&self, _config: &SerialConfig) -> Result<SerialPair> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.state.lock().unwrap();
            state.inbound = Some(tx);
            state.opens += 1;
        }

        Ok(SerialPair {
            reader: Box::new(MockSerialReader { inbound: rx }),
            writer: Box::new(MockSerialWriter {
                state: Arc::clone(&self.state),
                loopback: self.loopback,
                fail_writes: Arc::clone(&self.fail_writes),
                stall_writes: Arc::clone(&self.stall_writes),
            }),
        })
    }

    async fn port_exists(&self, _port: &str) -> bool {
        true
    }
}

pub struct FailingFactory {
    error_msg: String,
}

impl FailingFactory {
    pub fn new(error_msg: &str) -> Self {
        Self {
            error_msg: error_msg.to_string(),
        }
    }
}

#[async_trait]
impl SerialPortFactory for FailingFactory {
    async fn open(&self, _config: &SerialConfig) -> Result<SerialPair> {
        Err(SerialAssistError::SerialPort(self.error_msg.clone()))
    }

    async fn port_exists(&self, _port: &str) -> bool {
        false
    }
}

// ============================================================================
// Event helpers
// ============================================================================

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Next event, or None if nothing arrives within `timeout`
pub fn next_event(events: &mut EventReceiver, timeout: Duration) -> Option<SessionEvent> {
    let deadline = Instant::now() + timeout;
    loop {
        match events.try_recv() {
            Ok(event) => return Some(event),
            Err(TryRecvError::Empty) if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(2));
            }
            Err(_) => return None,
        }
    }
}

/// Skip events until one matches `pred`
pub fn wait_for(
    events: &mut EventReceiver,
    pred: impl Fn(&SessionEvent) -> bool,
) -> Option<SessionEvent> {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match next_event(events, remaining) {
            Some(event) if pred(&event) => return Some(event),
            Some(_) => continue,
            None => return None,
        }
    }
    None
}

pub fn wait_for_opened(events: &mut EventReceiver) -> bool {
    wait_for(events, |e| matches!(e, SessionEvent::PortOpened { .. })).is_some()
}

/// Everything already queued
pub fn drain(events: &mut EventReceiver) -> Vec<SessionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Poll `cond` until it holds or the timeout expires
pub fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Run `stop()` on a helper thread. False if it has not returned within
/// `timeout`.
pub fn stop_within(mut session: SerialSession, timeout: Duration) -> bool {
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    thread::spawn(move || {
        session.stop();
        let _ = done_tx.send(());
    });
    done_rx.recv_timeout(timeout).is_ok()
}

pub fn test_config() -> SerialConfig {
    SerialConfig::new("/dev/mock", 115_200)
}
