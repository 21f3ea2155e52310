//! Serial Assistant CLI
//!
//! Opens a serial port, prints everything received and transmits typed lines.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::Level;

use serial_assist::console::{encode_input, render_event};
#[cfg(feature = "mock")]
use serial_assist::MockSerialPortFactory;
use serial_assist::{
    load_config, Config, ConsoleCommand, ConsoleConfig, DataBits, DataFormat, FlowControl,
    OpenMode, Parity, SerialPortFactory, SerialSession, SessionEvent, StopBits,
};
#[cfg(not(feature = "mock"))]
use serial_assist::TokioSerialPortFactory;

#[derive(Parser)]
#[command(name = "serial-assist")]
#[command(about = "Serial port assistant: send and receive raw bytes as hex or ASCII")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port path (overrides config file)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate (overrides config file)
    #[arg(short, long)]
    baud_rate: Option<u32>,

    /// Data bits: 5, 6, 7, 8
    #[arg(long)]
    data_bits: Option<DataBits>,

    /// Stop bits: 1, 1.5, 2
    #[arg(long)]
    stop_bits: Option<StopBits>,

    /// Parity: none, even, odd, mark, space
    #[arg(long)]
    parity: Option<Parity>,

    /// Flow control: none, hardware, software
    #[arg(long)]
    flow_control: Option<FlowControl>,

    /// Open mode: read, write, read_write
    #[arg(long)]
    open_mode: Option<OpenMode>,

    /// How received bytes are shown: hex, ascii
    #[arg(long)]
    display: Option<DataFormat>,

    /// How typed lines are encoded: hex, ascii
    #[arg(long)]
    send_format: Option<DataFormat>,

    /// Repeat every typed line at this interval in milliseconds (0 = once)
    #[arg(long)]
    repeat_ms: Option<u64>,

    /// Log level
    #[arg(short, long, default_value = "warn", value_parser = parse_log_level)]
    log_level: Level,
}

fn parse_log_level(s: &str) -> Result<Level, String> {
    s.parse().map_err(|_| {
        format!(
            "Invalid log level: {}. Use: trace, debug, info, warn, error",
            s
        )
    })
}

fn apply_overrides(config: &mut Config, args: Args) {
    if let Some(port) = args.port {
        config.serial.port = port;
    }
    if let Some(baud_rate) = args.baud_rate {
        config.serial.baud_rate = baud_rate;
    }
    if let Some(data_bits) = args.data_bits {
        config.serial.data_bits = data_bits;
    }
    if let Some(stop_bits) = args.stop_bits {
        config.serial.stop_bits = stop_bits;
    }
    if let Some(parity) = args.parity {
        config.serial.parity = parity;
    }
    if let Some(flow_control) = args.flow_control {
        config.serial.flow_control = flow_control;
    }
    if let Some(open_mode) = args.open_mode {
        config.serial.open_mode = open_mode;
    }
    if let Some(display) = args.display {
        config.console.display = display;
    }
    if let Some(send_format) = args.send_format {
        config.console.send_format = send_format;
    }
    if let Some(repeat_ms) = args.repeat_ms {
        config.console.repeat_ms = repeat_ms;
    }
}

fn print_event(event: &SessionEvent, console: &ConsoleConfig) {
    let timestamp = console.timestamps.then(Local::now);
    println!("{}", render_event(event, console.display, timestamp));
}

/// Act on one typed line. Returns false when the console should exit.
fn handle_line(session: &SerialSession, console: &mut ConsoleConfig, line: &str) -> bool {
    match ConsoleCommand::parse(line, console.repeat_ms) {
        Ok(ConsoleCommand::Send { text, interval_ms }) => {
            let payload = encode_input(&text, console.send_format);
            if payload.is_empty() {
                tracing::warn!("Nothing to send for input {:?}", text);
            } else {
                session.send(payload, interval_ms);
            }
        }
        Ok(ConsoleCommand::StopRepeat) => session.cancel_repeat(),
        Ok(ConsoleCommand::SetDisplay(format)) => console.display = format,
        Ok(ConsoleCommand::SetSendFormat(format)) => console.send_format = format,
        Ok(ConsoleCommand::Status) => {
            let state = if session.is_open() { "open" } else { "closed" };
            println!("[{}: {}]", session.config().port, state);
        }
        Ok(ConsoleCommand::Quit) => return false,
        Err(e) => eprintln!("{}", e),
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, port={:?}, log_level={:?}",
        args.config,
        args.port,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };
    apply_overrides(&mut config, args);
    config.validate()?;

    tracing::info!("Starting serial assistant");
    #[cfg(feature = "mock")]
    tracing::info!("Running in MOCK MODE - loopback port, no real hardware");
    tracing::info!("Serial port: {}", config.serial.port);
    tracing::info!("Baud rate: {}", config.serial.baud_rate);

    #[cfg(feature = "mock")]
    let factory: Arc<dyn SerialPortFactory> = Arc::new(MockSerialPortFactory);
    #[cfg(not(feature = "mock"))]
    let factory: Arc<dyn SerialPortFactory> = Arc::new(TokioSerialPortFactory::new());

    if !factory.port_exists(&config.serial.port).await {
        tracing::warn!("Serial port {} does not exist", config.serial.port);
    }

    let mut session = SerialSession::with_factory(config.serial.clone(), factory)
        .with_options(config.session.clone());
    let mut console = config.console.clone();
    let mut events = session
        .take_events()
        .ok_or("session event stream already taken")?;

    session.start()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&event, &console);
                if matches!(
                    event,
                    SessionEvent::PortOpenFailed { .. } | SessionEvent::PortClosed { .. }
                ) {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) => {
                        if !handle_line(&session, &mut console, &line) {
                            break;
                        }
                    }
                    None => {
                        tracing::debug!("stdin closed, waiting for Ctrl-C");
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    // stop() joins the session thread
    let session = tokio::task::spawn_blocking(move || {
        session.stop();
        session
    })
    .await?;

    while let Ok(event) = events.try_recv() {
        print_event(&event, &console);
    }
    drop(session);

    Ok(())
}
