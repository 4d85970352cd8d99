//! Configuration model for grblhub
//!
//! One JSON document holds everything the controller needs from disk:
//! the serial connection defaults, the user macro library, and the
//! lifecycle event hooks.

use grblhub_core::{EventHook, MacroDef};
use serde::{Deserialize, Serialize};

/// Serial connection defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Port name (e.g. "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baudrate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baudrate: 115200,
        }
    }
}

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial connection defaults
    pub serial: SerialSettings,
    /// User macro library
    pub macros: Vec<MacroDef>,
    /// Lifecycle event hooks
    pub events: Vec<EventHook>,
}

impl Config {
    /// Look up a macro by id.
    pub fn find_macro(&self, id: &str) -> Option<&MacroDef> {
        self.macros.iter().find(|m| m.id == id)
    }
}
