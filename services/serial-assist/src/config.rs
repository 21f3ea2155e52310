//! Configuration types for the serial assistant

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::console::DataFormat;
use crate::error::{Result, SerialAssistError};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
}

impl Config {
    /// Reject values no serial port could be opened with
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.trim().is_empty() {
            return Err(SerialAssistError::InvalidConfig(
                "serial port path must not be empty".to_string(),
            ));
        }
        if self.serial.baud_rate == 0 {
            return Err(SerialAssistError::InvalidConfig(
                "baud rate must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serial port parameters.
///
/// Built once before a session starts and never changed afterwards; new
/// settings mean a new session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SerialConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub data_bits: DataBits,
    #[serde(default)]
    pub stop_bits: StopBits,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub flow_control: FlowControl,
    #[serde(default)]
    pub open_mode: OpenMode,
}

/// Behavior of the session's execution context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Ask the OS to schedule the session thread ahead of normal threads
    #[serde(default = "default_true")]
    pub high_priority: bool,
    /// Close the session when the transport reports a fatal fault
    #[serde(default)]
    pub stop_on_error: bool,
}

/// Terminal front end settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsoleConfig {
    #[serde(default = "default_display")]
    pub display: DataFormat,
    #[serde(default = "default_send_format")]
    pub send_format: DataFormat,
    /// Repeat interval applied to plain input lines, 0 sends them once
    #[serde(default)]
    pub repeat_ms: u64,
    #[serde(default = "default_true")]
    pub timestamps: bool,
}

/// Number of data bits per character
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StopBits {
    #[default]
    #[serde(rename = "1")]
    One,
    #[serde(rename = "1.5")]
    OnePointFive,
    #[serde(rename = "2")]
    Two,
}

/// Parity checking mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
    Mark,
    Space,
}

/// Flow control mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    #[default]
    None,
    Hardware,
    Software,
}

/// Direction(s) the port is opened for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    Read,
    Write,
    #[default]
    ReadWrite,
}

impl OpenMode {
    pub fn is_readable(self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, OpenMode::Write | OpenMode::ReadWrite)
    }
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(format!("Invalid data bits: {}. Use: 5, 6, 7, 8", other)),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl fmt::Display for DataBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

impl FromStr for DataBits {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let value: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("Invalid data bits: {}. Use: 5, 6, 7, 8", s))?;
        DataBits::try_from(value)
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        };
        f.write_str(s)
    }
}

impl FromStr for StopBits {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(StopBits::One),
            "1.5" => Ok(StopBits::OnePointFive),
            "2" => Ok(StopBits::Two),
            other => Err(format!("Invalid stop bits: {}. Use: 1, 1.5, 2", other)),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Parity::None => "none",
            Parity::Even => "even",
            Parity::Odd => "odd",
            Parity::Mark => "mark",
            Parity::Space => "space",
        };
        f.write_str(s)
    }
}

impl FromStr for Parity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Parity::None),
            "even" => Ok(Parity::Even),
            "odd" => Ok(Parity::Odd),
            "mark" => Ok(Parity::Mark),
            "space" => Ok(Parity::Space),
            _ => Err(format!(
                "Invalid parity: {}. Use: none, even, odd, mark, space",
                s
            )),
        }
    }
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowControl::None => "none",
            FlowControl::Hardware => "hardware",
            FlowControl::Software => "software",
        };
        f.write_str(s)
    }
}

impl FromStr for FlowControl {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(FlowControl::None),
            "hardware" => Ok(FlowControl::Hardware),
            "software" => Ok(FlowControl::Software),
            _ => Err(format!(
                "Invalid flow control: {}. Use: none, hardware, software",
                s
            )),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpenMode::Read => "read",
            OpenMode::Write => "write",
            OpenMode::ReadWrite => "read_write",
        };
        f.write_str(s)
    }
}

impl FromStr for OpenMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "read" => Ok(OpenMode::Read),
            "write" => Ok(OpenMode::Write),
            "read_write" => Ok(OpenMode::ReadWrite),
            _ => Err(format!(
                "Invalid open mode: {}. Use: read, write, read_write",
                s
            )),
        }
    }
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_true() -> bool {
    true
}

fn default_display() -> DataFormat {
    DataFormat::Hex
}

fn default_send_format() -> DataFormat {
    DataFormat::Ascii
}

impl SerialConfig {
    /// Configuration for `port` with every other parameter at its default
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: default_baud_rate(),
            data_bits: DataBits::default(),
            stop_bits: StopBits::default(),
            parity: Parity::default(),
            flow_control: FlowControl::default(),
            open_mode: OpenMode::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            high_priority: true,
            stop_on_error: false,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            display: default_display(),
            send_format: default_send_format(),
            repeat_ms: 0,
            timestamps: true,
        }
    }
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> std::result::Result<Config, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
