//! Serial I/O session
//!
//! A [`SerialSession`] owns one serial port for one open/close cycle. The port
//! is opened, used and dropped on a dedicated thread running its own
//! single-threaded tokio runtime, so the caller (typically a UI loop) never
//! blocks on serial I/O. Requests reach that thread over a command channel;
//! status and inbound data come back, in order, over an event channel.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{SerialConfig, SessionConfig};
use crate::error::Result;
use crate::io::{SerialPair, SerialPortFactory, SerialReader, SerialWriter};
use crate::serial::TokioSerialPortFactory;

/// Receiving end of a session's event stream
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Notifications produced by the session thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PortOpened { port: String },
    PortOpenFailed { port: String, reason: String },
    PortClosed { port: String },
    DataReceived(Vec<u8>),
    PortError(String),
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::PortOpened { port } => write!(f, "[Opened: {}]", port),
            SessionEvent::PortOpenFailed { port, reason } => {
                write!(f, "[Failed to open: {} | Error: {}]", port, reason)
            }
            SessionEvent::PortClosed { port } => write!(f, "[Closed: {}]", port),
            SessionEvent::DataReceived(data) => write!(f, "[Received {} bytes]", data.len()),
            SessionEvent::PortError(description) => write!(f, "[Error: {}]", description),
        }
    }
}

/// The repeating send currently governing the timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub payload: Vec<u8>,
    pub interval: Duration,
}

#[derive(Debug)]
enum Command {
    Send { payload: Vec<u8>, interval_ms: i64 },
    CancelRepeat,
    Shutdown,
}

struct Worker {
    commands: mpsc::UnboundedSender<Command>,
    thread: JoinHandle<()>,
}

/// One serial port session with its own execution context
pub struct SerialSession {
    config: SerialConfig,
    options: SessionConfig,
    factory: Arc<dyn SerialPortFactory>,
    port_open: Arc<AtomicBool>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Option<EventReceiver>,
    worker: Option<Worker>,
}

impl SerialSession {
    /// Create a stopped session for `config` backed by tokio-serial
    pub fn new(config: SerialConfig) -> Self {
        Self::with_factory(config, Arc::new(TokioSerialPortFactory::new()))
    }

    /// Create a stopped session that opens its port through `factory`
    pub fn with_factory(config: SerialConfig, factory: Arc<dyn SerialPortFactory>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            config,
            options: SessionConfig::default(),
            factory,
            port_open: Arc::new(AtomicBool::new(false)),
            events_tx,
            events_rx: Some(events_rx),
            worker: None,
        }
    }

    pub fn with_options(mut self, options: SessionConfig) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Take the event stream.
    ///
    /// There is exactly one stream per session and it spans every start/stop
    /// cycle, so this returns `Some` only on the first call.
    pub fn take_events(&mut self) -> Option<EventReceiver> {
        self.events_rx.take()
    }

    /// Spawn the session thread and open the port on it.
    ///
    /// Returns as soon as the thread is running; the outcome of opening the
    /// port arrives as `PortOpened` or `PortOpenFailed`. Calling this on a
    /// running session does nothing.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            debug!("start() called while {} is already running", self.config.port);
            return Ok(());
        }

        // A previous context may have ended on its own (open failure, auto-stop)
        self.reap_worker();

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let context = SessionContext {
            config: self.config.clone(),
            options: self.options.clone(),
            factory: Arc::clone(&self.factory),
            port_open: Arc::clone(&self.port_open),
            events: self.events_tx.clone(),
            commands: commands_rx,
        };

        let thread = thread::Builder::new()
            .name(format!("serial-session {}", self.config.port))
            .spawn(move || context.run())?;

        self.worker = Some(Worker {
            commands: commands_tx,
            thread,
        });
        debug!("Session thread started for {}", self.config.port);
        Ok(())
    }

    /// Close the port and wait for the session thread to finish.
    ///
    /// Blocks until in-flight I/O completes. Once this returns no further
    /// event is produced. Calling it on a stopped session does nothing.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            debug!("stop() called while {} is not running", self.config.port);
            return;
        };

        // The context may already be gone, in which case join returns at once
        let _ = worker.commands.send(Command::Shutdown);
        if worker.thread.join().is_err() {
            warn!("Session thread for {} panicked", self.config.port);
        }
        self.port_open.store(false, Ordering::SeqCst);
        debug!("Session thread for {} joined", self.config.port);
    }

    /// Write `payload` once (`interval_ms <= 0`) or every `interval_ms`
    /// milliseconds, replacing any repeating send already armed.
    ///
    /// Ignored unless the port is open.
    pub fn send(&self, payload: impl Into<Vec<u8>>, interval_ms: i64) {
        let Some(worker) = self.open_worker() else {
            debug!("Ignoring send: {} is not open", self.config.port);
            return;
        };

        let command = Command::Send {
            payload: payload.into(),
            interval_ms,
        };
        if worker.commands.send(command).is_err() {
            debug!("Ignoring send: session thread for {} has exited", self.config.port);
        }
    }

    /// Disarm the repeating send, if any
    pub fn cancel_repeat(&self) {
        let Some(worker) = self.open_worker() else {
            debug!("Ignoring cancel_repeat: {} is not open", self.config.port);
            return;
        };

        let _ = worker.commands.send(Command::CancelRepeat);
    }

    /// Whether the port is currently open
    pub fn is_open(&self) -> bool {
        self.port_open.load(Ordering::SeqCst)
    }

    /// Whether the session thread is alive
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.thread.is_finished())
    }

    fn open_worker(&self) -> Option<&Worker> {
        if !self.is_open() {
            return None;
        }
        self.worker.as_ref()
    }

    fn reap_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.thread.join().is_err() {
                warn!("Session thread for {} panicked", self.config.port);
            }
        }
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for SerialSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialSession")
            .field("config", &self.config)
            .field("options", &self.options)
            .field("port_open", &self.port_open)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Nice value requested for the session thread
#[cfg(target_os = "linux")]
const SESSION_THREAD_NICE: libc::c_int = -10;

/// Best-effort bump of the calling thread's scheduling priority.
///
/// On Linux `setpriority(PRIO_PROCESS, 0, ..)` applies to the calling thread
/// only. Without CAP_SYS_NICE the call fails and the thread keeps its
/// priority.
#[cfg(target_os = "linux")]
fn raise_thread_priority() {
    // SAFETY: setpriority takes no pointers and only affects scheduling.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, SESSION_THREAD_NICE) };
    if rc != 0 {
        debug!(
            "Could not raise session thread priority: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn raise_thread_priority() {}

/// The repeating send and the timer that drives it
struct RepeatTimer {
    pending: PendingSend,
    ticker: Interval,
}

impl RepeatTimer {
    fn arm(payload: Vec<u8>, interval: Duration) -> Self {
        // First write lands one full period after arming
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            pending: PendingSend { payload, interval },
            ticker,
        }
    }
}

/// A write in progress. It owns the writer and hands it back when done.
type WriteFuture = Pin<Box<dyn Future<Output = (Box<dyn SerialWriter>, Result<()>)> + Send>>;

struct Outbound {
    payload: Vec<u8>,
    repeat: bool,
}

/// Pending writes and the one currently on the wire.
///
/// At most one write is in flight. Its future is polled by the session loop
/// next to commands and reads, so a slow or stuck write never stops the
/// port from being read or closed. Dropping the outbox abandons any
/// unfinished write.
struct Outbox {
    writer: Option<Box<dyn SerialWriter>>,
    in_flight: Option<WriteFuture>,
    queue: VecDeque<Outbound>,
}

impl Outbox {
    fn new(writer: Box<dyn SerialWriter>) -> Self {
        Self {
            writer: Some(writer),
            in_flight: None,
            queue: VecDeque::new(),
        }
    }

    fn push(&mut self, payload: Vec<u8>, repeat: bool) {
        self.queue.push_back(Outbound { payload, repeat });
        self.pump();
    }

    /// Whether a write is on the wire or waiting for one
    fn is_busy(&self) -> bool {
        self.in_flight.is_some() || !self.queue.is_empty()
    }

    /// Forget queued writes of the repeating payload
    fn drop_repeats(&mut self) {
        self.queue.retain(|outbound| !outbound.repeat);
    }

    /// Put the next queued payload on the wire if the writer is free
    fn pump(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        let Some(Outbound { payload, .. }) = self.queue.pop_front() else {
            self.writer = Some(writer);
            return;
        };

        self.in_flight = Some(Box::pin(async move {
            let result = writer.write_bytes(&payload).await;
            (writer, result)
        }));
    }

    /// Wait for the write in flight to finish. Pending forever when idle.
    ///
    /// Cancel safe: the write lives in `in_flight` and resumes on the next
    /// call.
    async fn finished(&mut self) -> Result<()> {
        let Some(write) = self.in_flight.as_mut() else {
            return std::future::pending().await;
        };
        let (writer, result) = write.await;
        self.in_flight = None;
        self.writer = Some(writer);
        result
    }
}

/// Everything the session thread owns
struct SessionContext {
    config: SerialConfig,
    options: SessionConfig,
    factory: Arc<dyn SerialPortFactory>,
    port_open: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<SessionEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl SessionContext {
    fn run(self) {
        if self.options.high_priority {
            raise_thread_priority();
        }

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Failed to build runtime for {}: {}", self.config.port, e);
                self.emit(SessionEvent::PortOpenFailed {
                    port: self.config.port.clone(),
                    reason: format!("failed to start session runtime: {}", e),
                });
                return;
            }
        };

        runtime.block_on(self.serve());
    }

    async fn serve(mut self) {
        let port = self.config.port.clone();

        let SerialPair { reader, writer } = match self.factory.open(&self.config).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Failed to open {}: {}", port, e);
                self.emit(SessionEvent::PortOpenFailed {
                    port,
                    reason: e.to_string(),
                });
                return;
            }
        };

        // Both halves stay alive until close even when the open mode leaves
        // one of them unused
        let mode = self.config.open_mode;
        let mut reader = Some(reader);
        let mut outbox = Outbox::new(writer);
        let mut repeat: Option<RepeatTimer> = None;

        self.port_open.store(true, Ordering::SeqCst);
        info!(
            "Serial port {} opened at {} baud ({})",
            port, self.config.baud_rate, mode
        );
        self.emit(SessionEvent::PortOpened { port: port.clone() });

        loop {
            let flow = tokio::select! {
                // Commands first so a shutdown is never starved by a busy port
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Send { payload, interval_ms }) => {
                        self.handle_send(&mut outbox, &mut repeat, payload, interval_ms)
                    }
                    Some(Command::CancelRepeat) => {
                        if repeat.take().is_some() {
                            debug!("Repeat send on {} cancelled", port);
                        }
                        outbox.drop_repeats();
                        ControlFlow::Continue(())
                    }
                    Some(Command::Shutdown) | None => ControlFlow::Break(()),
                },
                result = outbox.finished() => {
                    let flow = self.handle_write_result(result);
                    outbox.pump();
                    flow
                }
                _ = next_tick(&mut repeat) => {
                    self.handle_tick(&mut outbox, repeat.as_ref());
                    ControlFlow::Continue(())
                }
                chunk = read_next(&mut reader), if mode.is_readable() => {
                    self.handle_read(&mut reader, chunk)
                }
            };

            if flow.is_break() {
                break;
            }
        }

        // Disarm before the handle goes away so the timer cannot fire on a
        // closed port. An unfinished write is abandoned with the outbox.
        drop(repeat);
        drop(reader);
        drop(outbox);

        self.port_open.store(false, Ordering::SeqCst);
        info!("Serial port {} closed", port);
        self.emit(SessionEvent::PortClosed { port });
    }

    fn handle_send(
        &self,
        outbox: &mut Outbox,
        repeat: &mut Option<RepeatTimer>,
        payload: Vec<u8>,
        interval_ms: i64,
    ) -> ControlFlow<()> {
        if !self.config.open_mode.is_writable() {
            debug!("Ignoring send: {} is opened read-only", self.config.port);
            return ControlFlow::Continue(());
        }

        if interval_ms <= 0 {
            outbox.push(payload, false);
            return ControlFlow::Continue(());
        }

        let interval = Duration::from_millis(interval_ms.unsigned_abs());
        debug!(
            "Repeat send on {} armed: {} bytes every {:?}",
            self.config.port,
            payload.len(),
            interval
        );
        // Replacing the timer drops the previous schedule entirely
        outbox.drop_repeats();
        *repeat = Some(RepeatTimer::arm(payload, interval));
        ControlFlow::Continue(())
    }

    fn handle_tick(&self, outbox: &mut Outbox, repeat: Option<&RepeatTimer>) {
        let Some(timer) = repeat else {
            return;
        };
        if outbox.is_busy() {
            debug!("Skipping repeat tick on {}: port is busy", self.config.port);
            return;
        }
        outbox.push(timer.pending.payload.clone(), true);
    }

    fn handle_write_result(&self, result: Result<()>) -> ControlFlow<()> {
        match result {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => {
                warn!("Write to {} failed: {}", self.config.port, e);
                self.emit(SessionEvent::PortError(e.to_string()));
                self.after_fault()
            }
        }
    }

    fn handle_read(
        &self,
        reader: &mut Option<Box<dyn SerialReader>>,
        chunk: Result<Option<Vec<u8>>>,
    ) -> ControlFlow<()> {
        match chunk {
            Ok(Some(data)) => {
                if !data.is_empty() {
                    self.emit(SessionEvent::DataReceived(data));
                }
                ControlFlow::Continue(())
            }
            Ok(None) => {
                warn!("Serial port {} reached end of stream", self.config.port);
                *reader = None;
                self.emit(SessionEvent::PortError(format!(
                    "{} reached end of stream",
                    self.config.port
                )));
                self.after_fault()
            }
            Err(e) if e.is_transient() => {
                debug!("Transient read fault on {}: {}", self.config.port, e);
                ControlFlow::Continue(())
            }
            Err(e) => {
                warn!("Read from {} failed: {}", self.config.port, e);
                // Park the reader so a dead device does not flood the channel
                *reader = None;
                self.emit(SessionEvent::PortError(e.to_string()));
                self.after_fault()
            }
        }
    }

    fn after_fault(&self) -> ControlFlow<()> {
        if self.options.stop_on_error {
            info!("Closing {} after transport fault", self.config.port);
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Event dropped: receiver for {} is gone", self.config.port);
        }
    }
}

async fn next_tick(repeat: &mut Option<RepeatTimer>) {
    match repeat {
        Some(timer) => {
            timer.ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn read_next(reader: &mut Option<Box<dyn SerialReader>>) -> Result<Option<Vec<u8>>> {
    match reader {
        Some(reader) => reader.read_chunk().await,
        None => std::future::pending().await,
    }
}
