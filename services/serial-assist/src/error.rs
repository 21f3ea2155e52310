//! Error types for the serial assistant

use std::io::ErrorKind;

/// Errors that can occur while configuring or driving a serial port
#[derive(Debug, thiserror::Error)]
pub enum SerialAssistError {
    #[error("Serial port error: {0}")]
    SerialPort(String),

    #[error("Unsupported setting: {0}")]
    UnsupportedSetting(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device communication error: {0}")]
    Communication(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SerialAssistError {
    /// Whether the fault is worth retrying rather than reporting.
    ///
    /// Only I/O interruptions and timeouts qualify; everything else is a
    /// transport fault the caller should hear about.
    pub fn is_transient(&self) -> bool {
        match self {
            SerialAssistError::Io(e) => matches!(
                e.kind(),
                ErrorKind::TimedOut | ErrorKind::Interrupted | ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Result type alias for serial assistant operations
pub type Result<T> = std::result::Result<T, SerialAssistError>;
