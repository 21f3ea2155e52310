//! Terminal front end helpers
//!
//! Turns typed lines into session requests and session events into
//! printable lines.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::hex::{parse_hex, to_hex_string};
use crate::session::SessionEvent;

/// How bytes are shown on screen or typed in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    Hex,
    Ascii,
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::Hex => f.write_str("hex"),
            DataFormat::Ascii => f.write_str("ascii"),
        }
    }
}

impl FromStr for DataFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hex" => Ok(DataFormat::Hex),
            "ascii" => Ok(DataFormat::Ascii),
            _ => Err(format!("Invalid data format: {}. Use: hex, ascii", s)),
        }
    }
}

/// Convert typed text into the bytes to transmit
pub fn encode_input(text: &str, format: DataFormat) -> Vec<u8> {
    match format {
        DataFormat::Ascii => text.as_bytes().to_vec(),
        DataFormat::Hex => parse_hex(text),
    }
}

/// Render received bytes for display
pub fn format_received(data: &[u8], format: DataFormat) -> String {
    match format {
        DataFormat::Hex => to_hex_string(data),
        DataFormat::Ascii => String::from_utf8_lossy(data).into_owned(),
    }
}

/// Render one session event, optionally prefixed with a timestamp line
pub fn render_event(
    event: &SessionEvent,
    format: DataFormat,
    timestamp: Option<DateTime<Local>>,
) -> String {
    let body = match event {
        SessionEvent::DataReceived(data) => format_received(data, format),
        other => other.to_string(),
    };

    match timestamp {
        Some(ts) => format!("[{}]\n{}", ts.format("%Y-%m-%d %H:%M:%S%.3f"), body),
        None => body,
    }
}

/// A line typed at the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Transmit text once (`interval_ms <= 0`) or repeatedly
    Send { text: String, interval_ms: i64 },
    /// Disarm the repeating send
    StopRepeat,
    /// Change how received bytes are shown
    SetDisplay(DataFormat),
    /// Change how typed text is encoded
    SetSendFormat(DataFormat),
    /// Print whether the port is open
    Status,
    Quit,
}

impl ConsoleCommand {
    /// Parse a console line.
    ///
    /// Plain text is sent, repeated every `repeat_ms` when that is non-zero.
    /// Lines starting with `/` are commands.
    pub fn parse(line: &str, repeat_ms: u64) -> Result<Self, String> {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(command) = line.strip_prefix('/') else {
            return Ok(ConsoleCommand::Send {
                text: line.to_string(),
                interval_ms: repeat_interval(repeat_ms),
            });
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim_start()),
            None => (command, ""),
        };

        match name {
            "quit" | "exit" => Ok(ConsoleCommand::Quit),
            "stop" => Ok(ConsoleCommand::StopRepeat),
            "status" => Ok(ConsoleCommand::Status),
            "once" => Ok(ConsoleCommand::Send {
                text: rest.to_string(),
                interval_ms: -1,
            }),
            "repeat" => {
                let (interval, text) = rest
                    .split_once(char::is_whitespace)
                    .unwrap_or((rest, ""));
                let interval_ms: i64 = interval
                    .parse()
                    .map_err(|_| format!("Invalid repeat interval: {}", interval))?;
                if interval_ms <= 0 {
                    return Err("Repeat interval must be greater than zero".to_string());
                }
                Ok(ConsoleCommand::Send {
                    text: text.trim_start().to_string(),
                    interval_ms,
                })
            }
            "display" => rest.parse().map(ConsoleCommand::SetDisplay),
            "send-format" => rest.parse().map(ConsoleCommand::SetSendFormat),
            other => Err(format!(
                "Unknown command: /{}. Use: /once, /repeat, /stop, /display, /send-format, /status, /quit",
                other
            )),
        }
    }
}

fn repeat_interval(repeat_ms: u64) -> i64 {
    if repeat_ms == 0 {
        -1
    } else {
        i64::try_from(repeat_ms).unwrap_or(i64::MAX)
    }
}
