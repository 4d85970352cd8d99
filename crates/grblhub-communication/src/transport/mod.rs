//! Byte transport between the controller and the firmware.
//!
//! The controller owns exactly one [`Transport`]; no other subsystem writes
//! to the port. The trait is synchronous: reads are polled with a short
//! timeout by the service loop, writes complete before returning.

pub mod serial;

use grblhub_core::Result;
use serde::{Deserialize, Serialize};

pub use serial::{list_ports, SerialPortInfo, SerialTransport};

/// Options for a serial connection. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialOptions {
    /// Port name (e.g. "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
}

fn default_baudrate() -> u32 {
    115200
}

impl SerialOptions {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baudrate: default_baudrate(),
        }
    }

    pub fn with_baudrate(mut self, baudrate: u32) -> Self {
        self.baudrate = baudrate;
        self
    }
}

/// A line-agnostic byte transport. 8-N-1 framing at the configured baud.
pub trait Transport: Send {
    /// Open the transport with the given options.
    fn open(&mut self, options: &SerialOptions) -> Result<()>;

    /// Close the transport. Closing an unopened transport is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Whether the transport is currently open.
    fn is_open(&self) -> bool;

    /// Write the full buffer. Bytes written within a single call arrive in
    /// program order.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read whatever bytes are available, up to `buf.len()`. Returns 0 when
    /// nothing arrived within the transport's short poll timeout. Chunk
    /// boundaries are arbitrary; the line parser reassembles lines.
    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize>;
}
