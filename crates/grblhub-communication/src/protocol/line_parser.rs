//! Incremental Grbl line parser
//!
//! Consumes opaque byte chunks from the transport, splits them on `\n`, and
//! classifies each complete line into one message. The transport may deliver
//! arbitrary chunk boundaries; a partial trailing line is carried until its
//! terminator arrives and never mutates state.
//!
//! Understands both the Grbl v1.1 report format (`<Idle|MPos:...|FS:...>`)
//! and the v0.9 comma-separated variant (`<Idle,MPos:...,WPos:...>`).

use grblhub_core::{
    ActiveState, BufferCounts, MachineState, Modal, Overrides, Position,
};
use regex::Regex;
use std::sync::OnceLock;

fn setting_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$(\d+)=(.*)$").expect("valid regex"))
}

fn startup_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^grbl\s+(\S+)").expect("valid regex"))
}

// Grbl 0.9 parser state: bracketed modal words without the GC: prefix,
// e.g. [G0 G54 G17 G21 G90 G94 M0 M5 M9 T0 F500. S0]
fn modal_words_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^G[0-9]+(?:\.[0-9])?(?:\s+[A-Z][0-9.\-]+)+$").expect("valid regex")
    })
}

/// An `error:` reply. Grbl 1.1 reports a numeric code, 0.9 a description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrblError {
    pub code: Option<u8>,
    pub text: String,
}

/// An `ALARM:` message. Same code/description split as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrblAlarm {
    pub code: Option<u8>,
    pub text: String,
}

/// One parsed status report. Fields absent from the report are `None`;
/// the parser merges present fields into the machine state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusReport {
    pub state: Option<ActiveState>,
    pub mpos: Option<Position>,
    pub wpos: Option<Position>,
    pub wco: Option<Position>,
    pub buf: Option<BufferCounts>,
    pub feed_rate: Option<f64>,
    pub spindle_speed: Option<f64>,
    pub overrides: Option<Overrides>,
    /// Accessory state flags (`A:SFM`)
    pub accessories: Option<String>,
}

/// One classified line from the firmware.
#[derive(Debug, Clone, PartialEq)]
pub enum GrblMessage {
    /// `<...>` status report
    Status(StatusReport),
    /// `ok` acknowledgement
    Ok,
    /// `error:N` or `error: description`
    Error(GrblError),
    /// `ALARM:N` or `ALARM: description`
    Alarm(GrblAlarm),
    /// `[GC:...]` (or bare 0.9 modal list) parser state
    ParserState(Modal),
    /// `[G54:...]`, `[TLO:...]`, `[PRB:...]` and friends
    Parameter { name: String, value: String },
    /// `[MSG:...]`, `[HLP:...]`, `[echo:...]` and other bracketed feedback
    Feedback(String),
    /// `$N=V` setting line
    Setting { number: u16, value: String },
    /// `Grbl X.Y` startup banner
    Startup { version: String },
    /// Anything else non-empty
    Other(String),
}

/// A raw line together with its classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub raw: String,
    pub message: GrblMessage,
}

/// Incremental parser holding the last-known machine state.
pub struct LineParser {
    buffer: String,
    state: MachineState,
    last_wco: Option<Position>,
}

impl LineParser {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            state: MachineState::default(),
            last_wco: None,
        }
    }

    /// The last-known machine state.
    pub fn state(&self) -> &MachineState {
        &self.state
    }

    /// Drop the partial-line buffer and reset the machine state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = MachineState::default();
        self.last_wco = None;
    }

    /// Feed a byte chunk; returns one classified message per completed line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<ParsedLine> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer.drain(..=pos);

            if line.is_empty() {
                continue;
            }

            let message = self.classify(&line);
            self.apply(&message);
            out.push(ParsedLine { raw: line, message });
        }
        out
    }

    fn classify(&self, line: &str) -> GrblMessage {
        if line == "ok" {
            return GrblMessage::Ok;
        }

        if line.starts_with('<') && line.ends_with('>') {
            return GrblMessage::Status(parse_status(&line[1..line.len() - 1]));
        }

        if let Some(prefix) = line.get(..6) {
            if prefix.eq_ignore_ascii_case("error:") {
                let rest = line[6..].trim();
                return GrblMessage::Error(GrblError {
                    code: rest.parse::<u8>().ok(),
                    text: rest.to_string(),
                });
            }
            if prefix.eq_ignore_ascii_case("alarm:") {
                let rest = line[6..].trim();
                return GrblMessage::Alarm(GrblAlarm {
                    code: rest.parse::<u8>().ok(),
                    text: rest.to_string(),
                });
            }
        }

        if line.starts_with('[') && line.ends_with(']') {
            return classify_bracketed(&line[1..line.len() - 1]);
        }

        if let Some(caps) = setting_re().captures(line) {
            if let Ok(number) = caps[1].parse::<u16>() {
                return GrblMessage::Setting {
                    number,
                    value: caps[2].trim().to_string(),
                };
            }
        }

        if let Some(caps) = startup_re().captures(line) {
            return GrblMessage::Startup {
                version: caps[1].to_string(),
            };
        }

        GrblMessage::Other(line.to_string())
    }

    fn apply(&mut self, message: &GrblMessage) {
        match message {
            GrblMessage::Status(report) => {
                if let Some(state) = report.state {
                    self.state.active_state = state;
                }
                if let Some(wco) = report.wco {
                    self.last_wco = Some(wco);
                }
                // Grbl reports either MPos or WPos depending on $10; derive
                // the missing space through the last-seen WCO.
                let wco = self.last_wco.unwrap_or_default();
                if let Some(mpos) = report.mpos {
                    self.state.machine_position = mpos;
                    self.state.work_position = report.wpos.unwrap_or_else(|| mpos.minus(&wco));
                } else if let Some(wpos) = report.wpos {
                    self.state.work_position = wpos;
                    self.state.machine_position = wpos.plus(&wco);
                }
                if let Some(buf) = report.buf {
                    self.state.buf = Some(buf);
                }
                if let Some(feed) = report.feed_rate {
                    self.state.feed_rate = feed;
                }
                if let Some(speed) = report.spindle_speed {
                    self.state.spindle_speed = speed;
                }
                if let Some(ov) = report.overrides {
                    self.state.overrides = ov;
                }
            }
            GrblMessage::ParserState(modal) => {
                self.state.modal = modal.clone();
            }
            GrblMessage::Startup { version } => {
                self.state.version = Some(version.clone());
            }
            _ => {}
        }
    }
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify the interior of a `[...]` line.
fn classify_bracketed(inner: &str) -> GrblMessage {
    if let Some(words) = inner.strip_prefix("GC:") {
        return GrblMessage::ParserState(parse_modal(words));
    }

    if modal_words_re().is_match(inner) {
        return GrblMessage::ParserState(parse_modal(inner));
    }

    const PARAMETER_NAMES: [&str; 11] = [
        "G54", "G55", "G56", "G57", "G58", "G59", "G28", "G30", "G92", "TLO", "PRB",
    ];
    if let Some((name, value)) = inner.split_once(':') {
        if PARAMETER_NAMES.contains(&name) {
            return GrblMessage::Parameter {
                name: name.to_string(),
                value: value.to_string(),
            };
        }
        for prefix in ["MSG", "HLP", "echo"] {
            if name.eq_ignore_ascii_case(prefix) {
                return GrblMessage::Feedback(value.trim().to_string());
            }
        }
    }

    // Grbl 0.9 feedback has no prefix ("['$H'|'$X' to unlock]")
    GrblMessage::Feedback(inner.to_string())
}

/// Parse the field list of a status report.
///
/// Grbl 1.1 separates fields with `|`; 0.9 uses `,` including inside
/// coordinate lists, so tokens without a `:` are folded into the field
/// before them.
fn parse_status(inner: &str) -> StatusReport {
    let fields: Vec<String> = if inner.contains('|') {
        inner.split('|').map(str::to_string).collect()
    } else {
        let mut fields: Vec<String> = Vec::new();
        for token in inner.split(',') {
            match fields.last_mut() {
                Some(last) if !token.contains(':') => {
                    last.push(',');
                    last.push_str(token);
                }
                _ => fields.push(token.to_string()),
            }
        }
        fields
    };

    let mut report = StatusReport::default();
    let mut iter = fields.iter();

    if let Some(state_field) = iter.next() {
        report.state = ActiveState::parse(state_field);
    }

    for field in iter {
        let field = field.trim();
        if let Some(pos) = field.strip_prefix("MPos:") {
            report.mpos = Position::parse(pos);
        } else if let Some(pos) = field.strip_prefix("WPos:") {
            report.wpos = Position::parse(pos);
        } else if let Some(pos) = field.strip_prefix("WCO:") {
            report.wco = Position::parse(pos);
        } else if let Some(buf) = field.strip_prefix("Bf:") {
            report.buf = parse_buffer_counts(buf);
        } else if let Some(planner) = field.strip_prefix("Buf:") {
            // 0.9 planner count; rx arrives in a separate RX: field
            let mut counts = report.buf.unwrap_or_default();
            counts.planner = planner.trim().parse().unwrap_or(0);
            report.buf = Some(counts);
        } else if let Some(rx) = field.strip_prefix("RX:") {
            let mut counts = report.buf.unwrap_or_default();
            counts.rx = rx.trim().parse().unwrap_or(0);
            report.buf = Some(counts);
        } else if let Some(fs) = field.strip_prefix("FS:") {
            let mut parts = fs.split(',');
            report.feed_rate = parts.next().and_then(|v| v.trim().parse().ok());
            report.spindle_speed = parts.next().and_then(|v| v.trim().parse().ok());
        } else if let Some(f) = field.strip_prefix("F:") {
            report.feed_rate = f.trim().parse().ok();
        } else if let Some(ov) = field.strip_prefix("Ov:") {
            report.overrides = parse_overrides(ov);
        } else if let Some(acc) = field.strip_prefix("A:") {
            report.accessories = Some(acc.to_string());
        }
        // Pn:, Ln:, and unknown fields are tolerated and skipped
    }

    report
}

fn parse_buffer_counts(s: &str) -> Option<BufferCounts> {
    let mut parts = s.split(',');
    let planner = parts.next()?.trim().parse().ok()?;
    let rx = parts.next()?.trim().parse().ok()?;
    Some(BufferCounts { planner, rx })
}

fn parse_overrides(s: &str) -> Option<Overrides> {
    let mut parts = s.split(',');
    let feed = parts.next()?.trim().parse().ok()?;
    let rapid = parts.next()?.trim().parse().ok()?;
    let spindle = parts.next()?.trim().parse().ok()?;
    Some(Overrides {
        feed,
        rapid,
        spindle,
    })
}

/// Categorize `$G` modal words into their groups.
fn parse_modal(words: &str) -> Modal {
    let mut modal = Modal::default();
    for word in words.split_whitespace() {
        match word {
            "G0" | "G1" | "G2" | "G3" | "G38.2" | "G38.3" | "G38.4" | "G38.5" | "G80" => {
                modal.motion = word.to_string();
            }
            "G54" | "G55" | "G56" | "G57" | "G58" | "G59" => {
                modal.wcs = word.to_string();
            }
            "G17" | "G18" | "G19" => {
                modal.plane = word.to_string();
            }
            "G20" | "G21" => {
                modal.units = word.to_string();
            }
            "G90" | "G91" => {
                modal.distance = word.to_string();
            }
            "G93" | "G94" => {
                modal.feedrate = word.to_string();
            }
            "M0" | "M1" | "M2" | "M30" => {
                modal.program = word.to_string();
            }
            "M3" | "M4" | "M5" => {
                modal.spindle = word.to_string();
            }
            "M7" | "M8" | "M9" => {
                modal.coolant = word.to_string();
            }
            // T/F/S value words are not modal groups
            _ => {}
        }
    }
    modal
}
