//! Grbl numeric code lookups
//!
//! Grbl v1.1 reports errors and alarms as bare numeric codes; the controller
//! decorates them with descriptions before forwarding to clients. Settings
//! numbers get a short name for the same reason.

/// Description for a Grbl v1.1 error code.
pub fn error_description(code: u8) -> Option<&'static str> {
    Some(match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid statement",
        4 => "Value < 0",
        5 => "Setting disabled",
        6 => "Value < 3 usec",
        7 => "EEPROM read fail. Using defaults",
        8 => "Not idle",
        9 => "G-code lock",
        10 => "Homing not enabled",
        11 => "Line overflow",
        12 => "Step rate > 30kHz",
        13 => "Check Door",
        14 => "Line length exceeded",
        15 => "Travel exceeded",
        16 => "Invalid jog command",
        17 => "Setting disabled (laser mode requires PWM output)",
        20 => "Unsupported command",
        21 => "Modal group violation",
        22 => "Undefined feed rate",
        23 => "Command value not integer",
        24 => "Value word conflict",
        25 => "Value word repeated",
        26 => "No axis words",
        27 => "Invalid line number",
        28 => "Value word missing",
        29 => "Unsupported coordinate system",
        30 => "G53 not allowed",
        31 => "Axis words exist",
        32 => "No axis words in plane",
        33 => "Invalid target",
        34 => "Arc radius error",
        35 => "No offsets in plane",
        36 => "Unused words",
        37 => "G43.1 disabled axis",
        38 => "Tool number out of range",
        _ => return None,
    })
}

/// Description for a Grbl v1.1 alarm code.
pub fn alarm_description(code: u8) -> Option<&'static str> {
    Some(match code {
        1 => "Hard limit triggered. Machine position is likely lost; re-homing is highly recommended",
        2 => "Motion target exceeds machine travel. Machine position safely retained",
        3 => "Reset while in motion. Grbl cannot guarantee position; lost steps are likely",
        4 => "Probe fail. Probe not in the expected initial state before the cycle",
        5 => "Probe fail. Probe did not contact the workpiece within the programmed travel",
        6 => "Homing fail. Reset during active homing cycle",
        7 => "Homing fail. Safety door opened during active homing cycle",
        8 => "Homing fail. Cycle failed to clear limit switch when pulling off",
        9 => "Homing fail. Could not find limit switch within search distance",
        _ => return None,
    })
}

/// Format an error for client display: `error:20 (Unsupported command)`.
pub fn format_error(code: Option<u8>, raw: &str) -> String {
    match code.and_then(error_description) {
        Some(desc) => format!("error:{} ({})", code.unwrap_or(0), desc),
        None => raw.to_string(),
    }
}

/// Format an alarm for client display: `ALARM:1 (Hard limit triggered. ...)`.
pub fn format_alarm(code: Option<u8>, raw: &str) -> String {
    match code.and_then(alarm_description) {
        Some(desc) => format!("ALARM:{} ({})", code.unwrap_or(0), desc),
        None => raw.to_string(),
    }
}

/// Short name for a `$N` setting number.
pub fn setting_name(number: u16) -> Option<&'static str> {
    Some(match number {
        0 => "Step pulse time",
        1 => "Step idle delay",
        2 => "Step pulse invert",
        3 => "Step direction invert",
        4 => "Invert step enable pin",
        5 => "Invert limit pins",
        6 => "Invert probe pin",
        10 => "Status report options",
        11 => "Junction deviation",
        12 => "Arc tolerance",
        13 => "Report in inches",
        20 => "Soft limits enable",
        21 => "Hard limits enable",
        22 => "Homing cycle enable",
        23 => "Homing direction invert",
        24 => "Homing locate feed rate",
        25 => "Homing search seek rate",
        26 => "Homing switch debounce delay",
        27 => "Homing switch pull-off distance",
        30 => "Maximum spindle speed",
        31 => "Minimum spindle speed",
        32 => "Laser-mode enable",
        100 => "X-axis travel resolution",
        101 => "Y-axis travel resolution",
        102 => "Z-axis travel resolution",
        110 => "X-axis maximum rate",
        111 => "Y-axis maximum rate",
        112 => "Z-axis maximum rate",
        120 => "X-axis acceleration",
        121 => "Y-axis acceleration",
        122 => "Z-axis acceleration",
        130 => "X-axis maximum travel",
        131 => "Y-axis maximum travel",
        132 => "Z-axis maximum travel",
        _ => return None,
    })
}
