//! Controller event surface
//!
//! The controller does not know how clients are attached; it emits named
//! events with serializable payloads into registered [`EventSink`]s. The
//! transport fanning these out (websocket, console, test capture) lives
//! outside the core.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::machine::MachineState;

/// Snapshot of the feeder queue, published as `feeder:status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeederStatus {
    /// Number of lines waiting for transmission
    pub queued: usize,
    /// Whether a head line exists
    pub pending: bool,
    /// Whether the feeder refuses new lines (alarm lockout)
    pub hold: bool,
}

/// Snapshot of the sender, published as `sender:status`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SenderStatus {
    /// Name of the loaded program, empty when unloaded
    pub name: String,
    /// Total program lines
    pub total: usize,
    /// Lines handed to the serial port
    pub sent: usize,
    /// Lines acknowledged by the firmware
    pub received: usize,
    /// Outstanding-bytes ceiling
    pub buffer_size: usize,
    /// Bytes currently unacknowledged
    pub data_length: usize,
}

/// Events emitted by the controller toward subscribed clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// The serial port was opened
    SerialPortOpen {
        port: String,
        baudrate: u32,
        controller_type: String,
        inuse: bool,
    },
    /// The serial port was closed
    SerialPortClose { port: String, inuse: bool },
    /// A transport error occurred
    SerialPortError { err: String, port: String },
    /// A byte sequence was written to the port
    SerialPortWrite(String),
    /// A parsed line was selectively forwarded to clients
    SerialPortRead(String),
    /// The machine state snapshot changed
    ControllerState(MachineState),
    /// Feeder queue snapshot
    FeederStatus(FeederStatus),
    /// Sender progress snapshot
    SenderStatus(SenderStatus),
}

impl ControllerEvent {
    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SerialPortOpen { .. } => "serialport:open",
            Self::SerialPortClose { .. } => "serialport:close",
            Self::SerialPortError { .. } => "serialport:error",
            Self::SerialPortWrite(_) => "serialport:write",
            Self::SerialPortRead(_) => "serialport:read",
            Self::ControllerState(_) => "controller:state",
            Self::FeederStatus(_) => "feeder:status",
            Self::SenderStatus(_) => "sender:status",
        }
    }

    /// The payload of this event as a JSON value.
    pub fn payload(&self) -> Value {
        match self {
            Self::SerialPortOpen {
                port,
                baudrate,
                controller_type,
                inuse,
            } => json!({
                "port": port,
                "baudrate": baudrate,
                "controllerType": controller_type,
                "inuse": inuse,
            }),
            Self::SerialPortClose { port, inuse } => json!({
                "port": port,
                "inuse": inuse,
            }),
            Self::SerialPortError { err, port } => json!({
                "err": err,
                "port": port,
            }),
            Self::SerialPortWrite(data) => Value::String(data.clone()),
            Self::SerialPortRead(data) => Value::String(data.clone()),
            Self::ControllerState(state) => {
                serde_json::to_value(state).unwrap_or(Value::Null)
            }
            Self::FeederStatus(status) => {
                serde_json::to_value(status).unwrap_or(Value::Null)
            }
            Self::SenderStatus(status) => {
                serde_json::to_value(status).unwrap_or(Value::Null)
            }
        }
    }
}

impl std::fmt::Display for ControllerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A sink capable of receiving named controller events.
///
/// Implemented by client transports; also implemented for plain closures so
/// tests can capture events without ceremony.
pub trait EventSink: Send {
    /// Deliver one event. Must not block.
    fn send(&self, event: &ControllerEvent);
}

impl<F> EventSink for F
where
    F: Fn(&ControllerEvent) + Send,
{
    fn send(&self, event: &ControllerEvent) {
        self(event)
    }
}
