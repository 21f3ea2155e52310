//! Mock serial port implementation for testing
//!
//! This module provides a loopback implementation of the serial I/O traits:
//! every byte written to the port is read back from it, as if TX were wired
//! to RX. It lets the console run without real hardware.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tracing::debug;

use crate::config::SerialConfig;
use crate::error::{Result, SerialAssistError};
use crate::io::{SerialPair, SerialPortFactory, SerialReader, SerialWriter};
use crate::serial::READ_BUFFER_SIZE;

/// Bytes the loopback link holds before a write waits for the reader
const LOOPBACK_BUFFER_SIZE: usize = 64 * 1024;

/// Mock serial reader returning whatever the paired writer wrote
pub struct LoopbackReader {
    stream: DuplexStream,
    buffer: Vec<u8>,
}

#[async_trait]
impl SerialReader for LoopbackReader {
    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let n = self.stream.read(&mut self.buffer).await?;
        if n == 0 {
            return Ok(None);
        }
        debug!("Mock serial read: {} bytes", n);
        Ok(Some(self.buffer[..n].to_vec()))
    }
}

/// Mock serial writer feeding the paired reader
pub struct LoopbackWriter {
    stream: DuplexStream,
}

#[async_trait]
impl SerialWriter for LoopbackWriter {
    async fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        debug!("Mock serial write: {} bytes", data.len());
        self.stream
            .write_all(data)
            .await
            .map_err(|e| SerialAssistError::Communication(format!("Failed to write: {}", e)))
    }
}

/// Mock serial port factory for testing
///
/// Each open creates a fresh loopback link; nothing persists across
/// open/close cycles.
#[derive(Clone, Default)]
pub struct MockSerialPortFactory;

#[async_trait]
impl SerialPortFactory for MockSerialPortFactory {
    async fn open(&self, config: &SerialConfig) -> Result<SerialPair> {
        debug!(
            "Mock serial port opened: {} at {} baud",
            config.port, config.baud_rate
        );

        let (tx, rx) = tokio::io::duplex(LOOPBACK_BUFFER_SIZE);

        Ok(SerialPair {
            reader: Box::new(LoopbackReader {
                stream: rx,
                buffer: vec![0; READ_BUFFER_SIZE],
            }),
            writer: Box::new(LoopbackWriter { stream: tx }),
        })
    }

    async fn port_exists(&self, _port: &str) -> bool {
        true
    }
}
