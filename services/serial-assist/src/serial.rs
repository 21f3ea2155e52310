//! Serial port implementation using tokio-serial
//!
//! This module provides concrete implementations of the I/O traits
//! using tokio-serial for actual hardware communication.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

use crate::config::{DataBits, FlowControl, Parity, SerialConfig, StopBits};
use crate::error::{Result, SerialAssistError};
use crate::io::{SerialPair, SerialPortFactory, SerialReader, SerialWriter};

/// Size of the buffer a single read can fill
pub const READ_BUFFER_SIZE: usize = 4096;

/// Serial reader using tokio-serial
pub struct TokioSerialReader {
    reader: ReadHalf<SerialStream>,
    buffer: Vec<u8>,
}

impl TokioSerialReader {
    /// Create a new serial reader from a read half of a serial stream
    pub fn new(reader: ReadHalf<SerialStream>) -> Self {
        Self {
            reader,
            buffer: vec![0; READ_BUFFER_SIZE],
        }
    }
}

#[async_trait]
impl SerialReader for TokioSerialReader {
    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let n = self.reader.read(&mut self.buffer).await?;
        if n == 0 {
            return Ok(None);
        }
        debug!("Serial read: {} bytes", n);
        Ok(Some(self.buffer[..n].to_vec()))
    }
}

/// Serial writer using tokio-serial
pub struct TokioSerialWriter {
    writer: WriteHalf<SerialStream>,
}

impl TokioSerialWriter {
    /// Create a new serial writer from a write half of a serial stream
    pub fn new(writer: WriteHalf<SerialStream>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl SerialWriter for TokioSerialWriter {
    async fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        debug!("Serial write: {} bytes", data.len());
        self.writer
            .write_all(data)
            .await
            .map_err(|e| SerialAssistError::Communication(format!("Failed to write: {}", e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| SerialAssistError::Communication(format!("Failed to flush: {}", e)))?;
        Ok(())
    }
}

fn data_bits(bits: DataBits) -> tokio_serial::DataBits {
    match bits {
        DataBits::Five => tokio_serial::DataBits::Five,
        DataBits::Six => tokio_serial::DataBits::Six,
        DataBits::Seven => tokio_serial::DataBits::Seven,
        DataBits::Eight => tokio_serial::DataBits::Eight,
    }
}

fn stop_bits(bits: StopBits) -> Result<tokio_serial::StopBits> {
    match bits {
        StopBits::One => Ok(tokio_serial::StopBits::One),
        StopBits::Two => Ok(tokio_serial::StopBits::Two),
        StopBits::OnePointFive => Err(SerialAssistError::UnsupportedSetting(
            "1.5 stop bits are not supported by the serial backend".to_string(),
        )),
    }
}

fn parity(parity: Parity) -> Result<tokio_serial::Parity> {
    match parity {
        Parity::None => Ok(tokio_serial::Parity::None),
        Parity::Even => Ok(tokio_serial::Parity::Even),
        Parity::Odd => Ok(tokio_serial::Parity::Odd),
        Parity::Mark | Parity::Space => Err(SerialAssistError::UnsupportedSetting(format!(
            "{} parity is not supported by the serial backend",
            parity
        ))),
    }
}

fn flow_control(flow: FlowControl) -> tokio_serial::FlowControl {
    match flow {
        FlowControl::None => tokio_serial::FlowControl::None,
        FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        FlowControl::Software => tokio_serial::FlowControl::Software,
    }
}

/// Serial port factory using tokio-serial
#[derive(Default, Clone)]
pub struct TokioSerialPortFactory;

impl TokioSerialPortFactory {
    /// Create a new serial port factory
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SerialPortFactory for TokioSerialPortFactory {
    async fn open(&self, config: &SerialConfig) -> Result<SerialPair> {
        debug!(
            "Opening serial port {} at {} baud ({} data bits, {} stop bits, {} parity, {} flow control)",
            config.port,
            config.baud_rate,
            config.data_bits,
            config.stop_bits,
            config.parity,
            config.flow_control
        );

        let stream = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(data_bits(config.data_bits))
            .stop_bits(stop_bits(config.stop_bits)?)
            .parity(parity(config.parity)?)
            .flow_control(flow_control(config.flow_control))
            .open_native_async()
            .map_err(|e| {
                SerialAssistError::SerialPort(format!("Failed to open {}: {}", config.port, e))
            })?;

        debug!("Serial port {} opened successfully", config.port);

        let (reader, writer) = tokio::io::split(stream);

        Ok(SerialPair {
            reader: Box::new(TokioSerialReader::new(reader)),
            writer: Box::new(TokioSerialWriter::new(writer)),
        })
    }

    async fn port_exists(&self, port: &str) -> bool {
        std::path::Path::new(port).exists()
    }
}
