//! Serial port transport implementation
//!
//! Provides low-level serial port operations for direct hardware connection
//! to Grbl controllers via USB or RS-232.
//!
//! Supports:
//! - Port enumeration and discovery, filtered to plausible CNC ports
//! - Baud rate configuration (8-N-1 framing)
//! - Short-timeout polled reads for the service loop

use grblhub_core::{ConnectionError, Result};
use std::io::{Read, Write};
use std::time::Duration;

use super::{SerialOptions, Transport};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g. "/dev/ttyUSB0", "COM3")
    pub port_name: String,
    /// Port description (e.g. "USB Serial Port")
    pub description: String,
    /// Manufacturer name if available
    pub manufacturer: Option<String>,
    /// Serial number if available
    pub serial_number: Option<String>,
}

/// List available serial ports on the system.
///
/// Filters ports to include only CNC controller patterns:
/// - Windows: COM* (e.g. COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        grblhub_core::Error::other(format!("Failed to enumerate ports: {}", e))
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_candidate_port(&port.port_name))
        .map(|port| {
            let (manufacturer, serial_number, description) = match &port.port_type {
                serialport::SerialPortType::UsbPort(usb) => (
                    usb.manufacturer.clone(),
                    usb.serial_number.clone(),
                    format!(
                        "USB {} {}",
                        usb.manufacturer.as_deref().unwrap_or("Device"),
                        usb.product.as_deref().unwrap_or("Serial Port")
                    ),
                ),
                serialport::SerialPortType::BluetoothPort => {
                    (None, None, "Bluetooth Serial".to_string())
                }
                _ => (None, None, "Serial Port".to_string()),
            };
            SerialPortInfo {
                port_name: port.port_name.clone(),
                description,
                manufacturer,
                serial_number,
            }
        })
        .collect())
}

/// Check if a port name matches common CNC controller patterns.
fn is_candidate_port(port_name: &str) -> bool {
    if port_name.starts_with("COM") && port_name[3..].chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    if port_name.starts_with("/dev/ttyUSB") || port_name.starts_with("/dev/ttyACM") {
        return true;
    }
    if port_name.starts_with("/dev/cu.usbserial-") || port_name.starts_with("/dev/cu.usbmodem") {
        return true;
    }
    false
}

/// Real serial transport using the `serialport` crate.
///
/// Reads use a 10 ms timeout so the service loop can poll without blocking
/// the executor.
pub struct SerialTransport {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
}

impl SerialTransport {
    pub fn new() -> Self {
        Self {
            port: None,
            name: String::new(),
        }
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SerialTransport {
    fn open(&mut self, options: &SerialOptions) -> Result<()> {
        if self.port.is_some() {
            return Err(ConnectionError::AlreadyOpen {
                port: self.name.clone(),
            }
            .into());
        }

        let port = serialport::new(&options.port, options.baudrate)
            .timeout(Duration::from_millis(10))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", options.port, e);
                ConnectionError::FailedToOpen {
                    port: options.port.clone(),
                    reason: e.to_string(),
                }
            })?;

        self.name = options.port.clone();
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.port = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or_else(|| ConnectionError::NotOpen {
            port: self.name.clone(),
        })?;
        port.write_all(data).map_err(|e| {
            ConnectionError::WriteFailed {
                port: self.name.clone(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or_else(|| ConnectionError::NotOpen {
            port: self.name.clone(),
        })?;
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(ConnectionError::ConnectionLost {
                reason: e.to_string(),
            }
            .into()),
        }
    }
}
