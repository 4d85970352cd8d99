//! Machine state owned by the line parser and read by everyone else.
//!
//! Every field reflects the latest successfully parsed message from the
//! firmware; partial lines never mutate state.

use serde::{Deserialize, Serialize};

/// Coarse execution mode reported in a Grbl status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActiveState {
    /// Waiting for work
    #[default]
    Idle,
    /// Executing motion
    Run,
    /// Feed hold in progress or complete
    Hold,
    /// Jog motion in progress
    Jog,
    /// Alarm lockout
    Alarm,
    /// Safety door opened
    Door,
    /// Check-gcode mode
    Check,
    /// Homing cycle in progress
    Home,
    /// Sleep mode
    Sleep,
}

impl ActiveState {
    /// Parse the state field of a status report.
    ///
    /// Grbl 1.1 may append a substate (`Hold:0`, `Door:1`); only the prefix
    /// is significant here.
    pub fn parse(s: &str) -> Option<Self> {
        let name = s.split(':').next().unwrap_or(s).trim();
        match name {
            "Idle" => Some(Self::Idle),
            "Run" => Some(Self::Run),
            "Hold" => Some(Self::Hold),
            "Jog" => Some(Self::Jog),
            "Alarm" => Some(Self::Alarm),
            "Door" => Some(Self::Door),
            "Check" => Some(Self::Check),
            "Home" => Some(Self::Home),
            "Sleep" => Some(Self::Sleep),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Run => "Run",
            Self::Hold => "Hold",
            Self::Jog => "Jog",
            Self::Alarm => "Alarm",
            Self::Door => "Door",
            Self::Check => "Check",
            Self::Home => "Home",
            Self::Sleep => "Sleep",
        };
        write!(f, "{}", name)
    }
}

/// A six-axis position, zero-defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Position {
    /// Parse a comma-separated coordinate list (`0.000,10.000,-2.500,...`).
    ///
    /// At least three coordinates are required; the rotary axes default
    /// to zero when absent.
    pub fn parse(s: &str) -> Option<Self> {
        let coords: Vec<f64> = s
            .split(',')
            .filter_map(|v| v.trim().parse::<f64>().ok())
            .collect();

        if coords.len() < 3 {
            return None;
        }

        Some(Self {
            x: coords[0],
            y: coords[1],
            z: coords[2],
            a: coords.get(3).copied().unwrap_or(0.0),
            b: coords.get(4).copied().unwrap_or(0.0),
            c: coords.get(5).copied().unwrap_or(0.0),
        })
    }

    /// Component-wise subtraction, used to derive WPos = MPos - WCO.
    pub fn minus(&self, other: &Position) -> Position {
        Position {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
            a: self.a - other.a,
            b: self.b - other.b,
            c: self.c - other.c,
        }
    }

    /// Component-wise addition, used to derive MPos = WPos + WCO.
    pub fn plus(&self, other: &Position) -> Position {
        Position {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
            a: self.a + other.a,
            b: self.b + other.b,
            c: self.c + other.c,
        }
    }
}

/// Last-seen parser modal groups, as reported by `$G`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modal {
    /// Motion mode (G0, G1, G2, G3, G38.2, G38.3, G38.4, G38.5, G80)
    pub motion: String,
    /// Work coordinate system (G54..G59)
    pub wcs: String,
    /// Plane selection (G17, G18, G19)
    pub plane: String,
    /// Units (G20, G21)
    pub units: String,
    /// Distance mode (G90, G91)
    pub distance: String,
    /// Feed rate mode (G93, G94)
    pub feedrate: String,
    /// Program mode (M0, M1, M2, M30)
    pub program: String,
    /// Spindle state (M3, M4, M5)
    pub spindle: String,
    /// Coolant state (M7, M8, M9)
    pub coolant: String,
}

/// Planner/rx buffer counts from the `Bf:` status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BufferCounts {
    /// Available planner blocks
    pub planner: u16,
    /// Available rx buffer bytes
    pub rx: u16,
}

/// Feed/rapid/spindle override percentages from the `Ov:` status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    pub feed: u16,
    pub rapid: u16,
    pub spindle: u16,
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            feed: 100,
            rapid: 100,
            spindle: 100,
        }
    }
}

/// The last-known machine state, rebuilt per connection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MachineState {
    /// Coarse execution mode
    pub active_state: ActiveState,
    /// Position in work coordinates
    pub work_position: Position,
    /// Position in machine coordinates
    pub machine_position: Position,
    /// Buffer counts, when the firmware reports them
    pub buf: Option<BufferCounts>,
    /// Modal groups from the last parser-state report
    pub modal: Modal,
    /// Current feed rate (units/min)
    pub feed_rate: f64,
    /// Current spindle speed (RPM)
    pub spindle_speed: f64,
    /// Override percentages
    pub overrides: Overrides,
    /// Firmware version from the startup banner
    pub version: Option<String>,
}
