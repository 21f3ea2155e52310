//! Serial Assistant
//!
//! Talk to serial (tty) devices: configure the port, open and close it,
//! watch received bytes as hex or ASCII, and transmit data once or on a
//! fixed interval.
//!
//! The core is [`SerialSession`], which owns one serial port on a dedicated
//! thread and reports everything that happens to it as an ordered stream of
//! [`SessionEvent`]s.

pub mod config;
pub mod console;
pub mod error;
pub mod hex;
pub mod io;
#[cfg(feature = "mock")]
pub mod mock;
pub mod serial;
pub mod session;

pub use config::{
    load_config, Config, ConsoleConfig, DataBits, FlowControl, OpenMode, Parity, SerialConfig,
    SessionConfig, StopBits,
};
pub use console::{ConsoleCommand, DataFormat};
pub use error::{Result, SerialAssistError};
pub use io::SerialPortFactory;
pub use serial::TokioSerialPortFactory;
pub use session::{EventReceiver, PendingSend, SerialSession, SessionEvent};

#[cfg(feature = "mock")]
pub use mock::MockSerialPortFactory;
