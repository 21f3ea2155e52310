//! I/O traits for serial communication
//!
//! This module provides trait abstractions for serial port operations.
//! These traits enable mockall-based testing without requiring actual hardware.

use async_trait::async_trait;

use crate::config::SerialConfig;
use crate::error::Result;

/// Pair of reader and writer for a serial connection
pub struct SerialPair {
    /// Reader for receiving data
    pub reader: Box<dyn SerialReader>,
    /// Writer for sending data
    pub writer: Box<dyn SerialWriter>,
}

/// Trait for reading raw bytes from a serial port
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait SerialReader: Send {
    /// Read whatever bytes are currently available
    ///
    /// Returns `Ok(Some(bytes))` with the bytes of a single read,
    /// `Ok(None)` if the port reached end of stream,
    /// or an error if reading failed.
    ///
    /// Implementations must be cancel safe: dropping the returned future
    /// before it completes must not lose any bytes.
    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Trait for writing raw bytes to a serial port
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait SerialWriter: Send {
    /// Write all of `data` and flush it to the device
    async fn write_bytes(&mut self, data: &[u8]) -> Result<()>;
}

/// Trait for creating serial port connections
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait SerialPortFactory: Send + Sync {
    /// Open a serial port with the given parameters
    ///
    /// Returns a pair of reader and writer on success.
    async fn open(&self, config: &SerialConfig) -> Result<SerialPair>;

    /// Check if a serial port exists and can be opened
    async fn port_exists(&self, port: &str) -> bool;
}
