//! Grbl controller: the orchestrator.
//!
//! Owns the line parser, feeder, sender, workflow, and event trigger; routes
//! parsed firmware messages to them; schedules the periodic polls; and
//! exposes the client command surface.
//!
//! All protocol state is mutated on one logical executor: serial bytes,
//! timer ticks, and client commands enter through `&mut self` methods and
//! run to completion before the next. The service layer provides the
//! executor; nothing here blocks.

use grblhub_core::{
    evaluate, ActiveState, Clock, CommandError, ConfigSource, ConnectionError, Context,
    ControllerEvent, EventSink, FileMonitorTrait, MachineState, NoOpConfigSource, NoOpFileMonitor,
    NoOpTaskRunner, Result, SenderStatus, SystemClock, TaskRunnerTrait,
};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::event_trigger::{EventTrigger, TriggeredAction};
use crate::feeder::Feeder;
use crate::protocol::codes;
use crate::protocol::line_parser::{GrblMessage, LineParser, ParsedLine};
use crate::sender::Sender;
use crate::transport::{SerialOptions, Transport};
use crate::workflow::Workflow;

/// Soft reset (ctrl-x)
pub const CMD_RESET: u8 = 0x18;
/// Status report query
pub const CMD_STATUS_REPORT: u8 = b'?';
/// Cycle start / resume
pub const CMD_CYCLE_START: u8 = b'~';
/// Feed hold
pub const CMD_FEED_HOLD: u8 = b'!';
/// Safety door
pub const CMD_SAFETY_DOOR: u8 = 0x84;
/// Jog cancel
pub const CMD_JOG_CANCEL: u8 = 0x85;
/// Feed override: reset / +10% / -10% / +1% / -1%
pub const CMD_FEED_OVR_RESET: u8 = 0x90;
pub const CMD_FEED_OVR_COARSE_PLUS: u8 = 0x91;
pub const CMD_FEED_OVR_COARSE_MINUS: u8 = 0x92;
pub const CMD_FEED_OVR_FINE_PLUS: u8 = 0x93;
pub const CMD_FEED_OVR_FINE_MINUS: u8 = 0x94;
/// Rapid override: 100% / 50% / 25%
pub const CMD_RAPID_OVR_RESET: u8 = 0x95;
pub const CMD_RAPID_OVR_MEDIUM: u8 = 0x96;
pub const CMD_RAPID_OVR_LOW: u8 = 0x97;
/// Spindle override: reset / +10% / -10% / +1% / -1%
pub const CMD_SPINDLE_OVR_RESET: u8 = 0x99;
pub const CMD_SPINDLE_OVR_COARSE_PLUS: u8 = 0x9a;
pub const CMD_SPINDLE_OVR_COARSE_MINUS: u8 = 0x9b;
pub const CMD_SPINDLE_OVR_FINE_PLUS: u8 = 0x9c;
pub const CMD_SPINDLE_OVR_FINE_MINUS: u8 = 0x9d;

/// Minimum interval between `$G` polls.
const PARSER_STATE_THROTTLE_MS: u64 = 500;
/// An unanswered `?` is reissued after this long.
const STATUS_QUERY_STALL_MS: u64 = 5_000;
/// An unanswered `$G` exchange is abandoned after this long.
const PARSER_STATE_STALL_MS: u64 = 10_000;
/// Delay between the hold and the soft reset of `gcode:stop`.
const STOP_RESET_DELAY_MS: u64 = 500;

fn bracket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]+\]").expect("valid regex"))
}

/// Map a single realtime character to its wire byte.
fn realtime_byte(data: &str) -> Option<u8> {
    let mut chars = data.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None)
            if matches!(
                c,
                '?' | '~'
                    | '!'
                    | '\u{18}'
                    | '\u{84}'
                    | '\u{85}'
                    | '\u{90}'..='\u{97}'
                    | '\u{99}'..='\u{9d}'
            ) =>
        {
            Some(c as u8)
        }
        _ => None,
    }
}

/// In-flight request bookkeeping for the periodic polls.
///
/// `?` and `$G` replies arrive interleaved with program acknowledgements;
/// these flags route them without touching the sender's accounting.
#[derive(Debug, Default)]
struct ActionFlags {
    /// A `$G` has been sent; awaiting the parser-state reply line
    query_parser_state: bool,
    /// The parser-state line arrived; awaiting the trailing `ok`
    query_parser_reply: bool,
    /// A `?` has been sent; awaiting the next status line
    query_status_report: bool,
    /// A user-originated `$G`: echo the reply to all clients
    reply_parser_state: bool,
    /// A user-originated `?`: echo the next status line to all clients
    reply_status_report: bool,
    /// Issue timestamps for stall recovery
    parser_state_issued_at: Option<u64>,
    status_report_issued_at: Option<u64>,
}

impl ActionFlags {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// The Grbl streaming controller.
///
/// Construct with [`GrblController::new`], attach collaborators with the
/// `with_*` builders, then drive it with `open`, `on_serial_data`, `tick`,
/// and `command`.
pub struct GrblController {
    options: SerialOptions,
    transport: Box<dyn Transport>,
    parser: LineParser,
    feeder: Feeder,
    sender: Sender,
    workflow: Workflow,
    event_trigger: EventTrigger,
    connections: HashMap<String, Box<dyn EventSink>>,
    clock: Arc<dyn Clock>,
    config: Arc<dyn ConfigSource>,
    monitor: Arc<dyn FileMonitorTrait>,
    task_runner: Arc<dyn TaskRunnerTrait>,
    /// False until a startup banner is parsed; gates the polls
    ready: bool,
    actions: ActionFlags,
    /// Last `$G` issue time, for the 500 ms throttle
    last_parser_poll: Option<u64>,
    /// Realtime bytes scheduled for a future tick (`gcode:stop` soft reset)
    delayed_writes: Vec<(u64, u8)>,
    last_emitted_state: Option<MachineState>,
    last_emitted_sender: Option<SenderStatus>,
}

impl GrblController {
    pub fn new(options: SerialOptions, transport: Box<dyn Transport>) -> Self {
        Self {
            options,
            transport,
            parser: LineParser::new(),
            feeder: Feeder::new(),
            sender: Sender::new(),
            workflow: Workflow::new(),
            event_trigger: EventTrigger::new(Vec::new()),
            connections: HashMap::new(),
            clock: Arc::new(SystemClock::new()),
            config: Arc::new(NoOpConfigSource),
            monitor: Arc::new(NoOpFileMonitor),
            task_runner: Arc::new(NoOpTaskRunner),
            ready: false,
            actions: ActionFlags::default(),
            last_parser_poll: None,
            delayed_writes: Vec::new(),
            last_emitted_state: None,
            last_emitted_sender: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: Arc<dyn ConfigSource>) -> Self {
        self.event_trigger = EventTrigger::new(config.event_hooks());
        self.config = config;
        self
    }

    pub fn with_file_monitor(mut self, monitor: Arc<dyn FileMonitorTrait>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_task_runner(mut self, runner: Arc<dyn TaskRunnerTrait>) -> Self {
        self.task_runner = runner;
        self
    }

    // ------------------------------------------------------------------
    // Lifecycle

    /// Open the serial port and reset all per-connection state.
    pub fn open(&mut self) -> Result<()> {
        if self.transport.is_open() {
            tracing::error!("Port {} is already open", self.options.port);
            return Err(ConnectionError::AlreadyOpen {
                port: self.options.port.clone(),
            }
            .into());
        }

        self.transport.open(&self.options)?;
        self.reset_session();
        tracing::info!(
            "Opened {} at {} baud",
            self.options.port,
            self.options.baudrate
        );
        self.emit(&ControllerEvent::SerialPortOpen {
            port: self.options.port.clone(),
            baudrate: self.options.baudrate,
            controller_type: "Grbl".to_string(),
            inuse: true,
        });
        Ok(())
    }

    /// Close the port, cancel all pending work, and empty the connection map.
    pub fn close(&mut self) -> Result<()> {
        if !self.transport.is_open() {
            tracing::error!("Port {} is not open", self.options.port);
            return Err(ConnectionError::NotOpen {
                port: self.options.port.clone(),
            }
            .into());
        }

        self.emit(&ControllerEvent::SerialPortClose {
            port: self.options.port.clone(),
            inuse: false,
        });
        self.transport.close()?;
        self.reset_session();
        self.connections.clear();
        tracing::info!("Closed {}", self.options.port);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    fn reset_session(&mut self) {
        self.parser.reset();
        self.feeder.set_hold(false);
        self.feeder.clear();
        self.sender.unload();
        self.workflow.stop();
        self.actions.clear();
        self.ready = false;
        self.last_parser_poll = None;
        self.delayed_writes.clear();
        self.last_emitted_state = None;
        self.last_emitted_sender = None;
    }

    // ------------------------------------------------------------------
    // Connection registry

    /// Register a client sink. The sink immediately receives the current
    /// machine state and, when a program is loaded, the sender status.
    pub fn add_connection(&mut self, id: impl Into<String>, sink: Box<dyn EventSink>) {
        sink.send(&ControllerEvent::ControllerState(self.parser.state().clone()));
        if self.sender.is_loaded() {
            sink.send(&ControllerEvent::SenderStatus(self.sender.status()));
        }
        self.connections.insert(id.into(), sink);
    }

    pub fn remove_connection(&mut self, id: &str) {
        self.connections.remove(id);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn emit(&self, event: &ControllerEvent) {
        tracing::trace!("emit {}: {}", event.name(), event.payload());
        for sink in self.connections.values() {
            sink.send(event);
        }
    }

    // ------------------------------------------------------------------
    // Writing

    fn port_write_bytes(&mut self, bytes: &[u8], emit_event: bool) {
        if !self.transport.is_open() {
            tracing::error!("Write on closed port {}", self.options.port);
            return;
        }
        if emit_event {
            self.emit(&ControllerEvent::SerialPortWrite(
                String::from_utf8_lossy(bytes).into_owned(),
            ));
        }
        if let Err(e) = self.transport.write(bytes) {
            self.on_transport_error(e.to_string());
        }
    }

    /// Write a string to the port, flagging user-originated `?`/`$G` so
    /// their replies are echoed back to clients.
    pub fn write(&mut self, data: &str) {
        let cmd = data.trim_end_matches(['\r', '\n']);
        if cmd == "?" {
            self.actions.reply_status_report = true;
        }
        if cmd == "$G" {
            self.actions.reply_parser_state = true;
        }
        self.port_write_bytes(data.as_bytes(), true);
    }

    /// Write a line. Realtime single-character commands go out bare (no
    /// newline); everything else gets the terminator appended.
    pub fn writeln(&mut self, data: &str) {
        if let Some(byte) = realtime_byte(data) {
            if byte == CMD_STATUS_REPORT {
                self.actions.reply_status_report = true;
            }
            self.write_realtime(byte);
        } else {
            self.write(&format!("{}\n", data));
        }
    }

    fn write_realtime(&mut self, byte: u8) {
        self.port_write_bytes(&[byte], true);
    }

    fn on_transport_error(&mut self, err: String) {
        tracing::error!("Transport error on {}: {}", self.options.port, err);
        self.emit(&ControllerEvent::SerialPortError {
            err,
            port: self.options.port.clone(),
        });
        if self.transport.is_open() {
            let _ = self.close();
        }
    }

    // ------------------------------------------------------------------
    // Inbound routing

    /// Feed raw bytes from the transport; arbitrary chunk boundaries are fine.
    pub fn on_serial_data(&mut self, bytes: &[u8]) {
        for parsed in self.parser.push(bytes) {
            self.route(parsed);
        }
    }

    /// Poll the transport for pending bytes and route them.
    pub fn pump_reads(&mut self) {
        let mut buf = [0u8; 256];
        loop {
            match self.transport.try_read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let bytes = buf[..n].to_vec();
                    self.on_serial_data(&bytes);
                }
                Err(e) => {
                    self.on_transport_error(e.to_string());
                    break;
                }
            }
        }
    }

    fn route(&mut self, parsed: ParsedLine) {
        let ParsedLine { raw, message } = parsed;
        match message {
            GrblMessage::Ok => self.on_ok(&raw),
            GrblMessage::Error(err) => self.on_error(err.code, &raw),
            GrblMessage::Status(report) => {
                self.on_status(report.buf.map(|b| b.rx as usize), &raw)
            }
            GrblMessage::ParserState(_) => self.on_parser_state(&raw),
            GrblMessage::Alarm(alarm) => self.on_alarm(alarm.code, &raw),
            GrblMessage::Startup { version } => self.on_startup(&version, &raw),
            GrblMessage::Setting { number, value: _ } => {
                let formatted = match codes::setting_name(number) {
                    Some(name) => format!("{} ({})", raw, name),
                    None => raw.clone(),
                };
                self.emit(&ControllerEvent::SerialPortRead(formatted));
            }
            GrblMessage::Parameter { .. } | GrblMessage::Feedback(_) | GrblMessage::Other(_) => {
                self.emit(&ControllerEvent::SerialPortRead(raw));
            }
        }
    }

    fn on_ok(&mut self, raw: &str) {
        // Trailing ok of a $G exchange
        if self.actions.query_parser_reply {
            self.actions.query_parser_reply = false;
            self.actions.parser_state_issued_at = None;
            if self.actions.reply_parser_state {
                self.actions.reply_parser_state = false;
                self.emit(&ControllerEvent::SerialPortRead(raw.to_string()));
            }
            return;
        }

        // Program acknowledgement
        if self.workflow.is_running() {
            self.sender.ack();
            self.pump_sender();
            return;
        }

        self.emit(&ControllerEvent::SerialPortRead(raw.to_string()));
        self.pump_feeder();
    }

    fn on_error(&mut self, code: Option<u8>, raw: &str) {
        if self.workflow.is_running() {
            // The oldest in-flight line is the one that failed. Report it
            // with its 1-based number; the operator decides whether to stop.
            let index = self.sender.received();
            let offending = self.sender.line_at(index).unwrap_or("").to_string();
            self.emit(&ControllerEvent::SerialPortRead(format!(
                "> {} (line {})",
                offending,
                index + 1
            )));
            self.emit(&ControllerEvent::SerialPortRead(codes::format_error(
                code, raw,
            )));
            self.sender.ack();
            self.pump_sender();
            return;
        }

        self.emit(&ControllerEvent::SerialPortRead(codes::format_error(
            code, raw,
        )));
        self.pump_feeder();
    }

    fn on_status(&mut self, reported_rx: Option<usize>, raw: &str) {
        self.actions.query_status_report = false;
        self.actions.status_report_issued_at = None;

        // Grow the window only while nothing is at stake: workflow idle and
        // no program bytes in flight. Otherwise an in-flight program could
        // be retrospectively over-admitted.
        if let Some(rx) = reported_rx {
            if self.workflow.is_idle() && self.sender.data_length() == 0 {
                self.sender.grow_window(rx);
            }
        }

        if self.actions.reply_status_report {
            self.actions.reply_status_report = false;
            self.emit(&ControllerEvent::SerialPortRead(raw.to_string()));
        }
    }

    fn on_parser_state(&mut self, raw: &str) {
        self.actions.query_parser_state = false;
        self.actions.query_parser_reply = true;
        if self.actions.reply_parser_state {
            self.emit(&ControllerEvent::SerialPortRead(raw.to_string()));
        }
    }

    fn on_alarm(&mut self, code: Option<u8>, raw: &str) {
        tracing::warn!("Alarm: {}", raw);
        self.emit(&ControllerEvent::SerialPortRead(codes::format_alarm(
            code, raw,
        )));
        // Drop queued ad-hoc lines and refuse new ones until unlock/reset
        self.feeder.set_hold(true);
    }

    fn on_startup(&mut self, version: &str, raw: &str) {
        tracing::info!("Grbl startup: {}", version);
        self.ready = true;
        self.actions.clear();
        self.last_parser_poll = None;
        self.emit(&ControllerEvent::SerialPortRead(raw.to_string()));
    }

    // ------------------------------------------------------------------
    // Pumps

    fn pump_feeder(&mut self) {
        if let Some(next) = self.feeder.next() {
            let line = next.line.trim().to_string();
            if line.is_empty() {
                return;
            }
            let translated = self.translate(&line, &next.context);
            self.writeln(&translated);
        }
    }

    fn pump_sender(&mut self) {
        for line in self.sender.next() {
            self.write(&format!("{}\n", line));
        }
    }

    // ------------------------------------------------------------------
    // Periodic tick

    /// Drive the periodic work: delayed writes, status fan-out, and the
    /// `?`/`$G` polls. Intended cadence is 250 ms while the port is open.
    pub fn tick(&mut self) {
        if !self.transport.is_open() {
            return;
        }
        let now = self.clock.now_millis();

        if !self.delayed_writes.is_empty() {
            let due: Vec<u8> = self
                .delayed_writes
                .iter()
                .filter(|(at, _)| now >= *at)
                .map(|(_, byte)| *byte)
                .collect();
            self.delayed_writes.retain(|(at, _)| now < *at);
            for byte in due {
                self.write_realtime(byte);
            }
        }

        if self.feeder.is_pending() {
            self.emit(&ControllerEvent::FeederStatus(self.feeder.status()));
        }

        let sender_status = self.sender.status();
        if self.last_emitted_sender.as_ref() != Some(&sender_status) {
            self.emit(&ControllerEvent::SenderStatus(sender_status.clone()));
            self.last_emitted_sender = Some(sender_status);
        }

        let machine = self.parser.state().clone();
        if self.last_emitted_state.as_ref() != Some(&machine) {
            self.emit(&ControllerEvent::ControllerState(machine.clone()));
            self.last_emitted_state = Some(machine);
        }

        if !self.ready {
            return;
        }

        // Status poll. The single `?` byte bypasses the sender's window.
        if self.actions.query_status_report {
            let stalled = self
                .actions
                .status_report_issued_at
                .is_some_and(|at| now.saturating_sub(at) >= STATUS_QUERY_STALL_MS);
            if stalled {
                tracing::warn!("Status query unanswered for 5s, reissuing");
                self.issue_status_poll(now);
            }
        } else {
            self.issue_status_poll(now);
        }

        // Parser-state poll, throttled. `$G\n` also bypasses the window;
        // the default window keeps 8 bytes of headroom for both polls.
        if self.actions.query_parser_state || self.actions.query_parser_reply {
            let stalled = self
                .actions
                .parser_state_issued_at
                .is_some_and(|at| now.saturating_sub(at) >= PARSER_STATE_STALL_MS);
            if stalled {
                tracing::warn!("Parser-state query unanswered for 10s, abandoning");
                self.actions.query_parser_state = false;
                self.actions.query_parser_reply = false;
                self.actions.parser_state_issued_at = None;
            }
        } else {
            let throttled = self
                .last_parser_poll
                .is_some_and(|at| now.saturating_sub(at) < PARSER_STATE_THROTTLE_MS);
            if !throttled {
                self.actions.query_parser_state = true;
                self.actions.parser_state_issued_at = Some(now);
                self.last_parser_poll = Some(now);
                self.port_write_bytes(b"$G\n", false);
            }
        }
    }

    fn issue_status_poll(&mut self, now: u64) {
        self.actions.query_status_report = true;
        self.actions.status_report_issued_at = Some(now);
        self.port_write_bytes(b"?", false);
    }

    // ------------------------------------------------------------------
    // Expression translation

    /// Replace every `[...]` group with its evaluated value.
    ///
    /// The evaluation context is the caller's variables, overlaid with the
    /// machine work position (`posx`..`posc`, which always win) over
    /// zero-defaulted travel bounds (`xmin`..`zmax`). A failed evaluation
    /// leaves the group unsubstituted.
    pub fn translate(&self, line: &str, context: &Context) -> String {
        if !bracket_re().is_match(line) {
            return line.to_string();
        }
        let vars = self.expression_vars(context);
        bracket_re()
            .replace_all(line, |caps: &regex::Captures<'_>| {
                let group = &caps[0];
                let expr = &group[1..group.len() - 1];
                match evaluate(expr, &vars) {
                    Ok(value) => value.to_string(),
                    Err(e) => {
                        tracing::error!("Expression {:?} failed: {}", group, e);
                        group.to_string()
                    }
                }
            })
            .into_owned()
    }

    fn expression_vars(&self, context: &Context) -> HashMap<String, f64> {
        let mut vars: HashMap<String, f64> = HashMap::new();
        for bound in ["xmin", "xmax", "ymin", "ymax", "zmin", "zmax"] {
            vars.insert(bound.to_string(), 0.0);
        }
        for (key, value) in context {
            if let Some(n) = value.as_f64() {
                vars.insert(key.clone(), n);
            }
        }
        let wpos = self.parser.state().work_position;
        vars.insert("posx".to_string(), wpos.x);
        vars.insert("posy".to_string(), wpos.y);
        vars.insert("posz".to_string(), wpos.z);
        vars.insert("posa".to_string(), wpos.a);
        vars.insert("posb".to_string(), wpos.b);
        vars.insert("posc".to_string(), wpos.c);
        vars
    }

    // ------------------------------------------------------------------
    // Command surface

    /// Dispatch a client command by name with positional JSON arguments.
    pub fn command(&mut self, client: &str, name: &str, args: &[Value]) -> Result<()> {
        tracing::debug!("command {} from {}", name, client);
        match name {
            "gcode:load" => {
                let program = arg_str(name, args, 0)?;
                let gcode = arg_str(name, args, 1)?;
                let context = arg_context(args, 2);
                self.fire_event("gcode:load");
                self.load_program(&program, &gcode, context)
            }
            "gcode:unload" => {
                self.fire_event("gcode:unload");
                self.stop_workflow();
                self.sender.unload();
                Ok(())
            }
            "gcode:start" => {
                if !self.sender.is_loaded() {
                    return Err(CommandError::InvalidProgram {
                        reason: "no program loaded".to_string(),
                    }
                    .into());
                }
                self.fire_event("gcode:start");
                if self.workflow.start() {
                    self.sender.rewind();
                    // Ad-hoc lines must not interleave with the program
                    self.feeder.clear();
                    self.pump_sender();
                }
                Ok(())
            }
            "gcode:stop" => {
                self.fire_event("gcode:stop");
                self.stop_streaming();
                Ok(())
            }
            "gcode:pause" => {
                self.fire_event("gcode:pause");
                self.workflow.pause();
                self.write_realtime(CMD_FEED_HOLD);
                Ok(())
            }
            "gcode:resume" => {
                self.fire_event("gcode:resume");
                self.write_realtime(CMD_CYCLE_START);
                if self.workflow.resume() {
                    self.pump_sender();
                }
                Ok(())
            }
            "feedhold" => {
                self.fire_event("feedhold");
                self.write_realtime(CMD_FEED_HOLD);
                Ok(())
            }
            "cyclestart" => {
                self.fire_event("cyclestart");
                self.write_realtime(CMD_CYCLE_START);
                Ok(())
            }
            "statusreport" => {
                self.fire_event("statusreport");
                self.write("?");
                Ok(())
            }
            "homing" => {
                self.fire_event("homing");
                self.writeln("$H");
                Ok(())
            }
            "sleep" => {
                self.fire_event("sleep");
                self.writeln("$SLP");
                Ok(())
            }
            "unlock" => {
                self.fire_event("unlock");
                self.feeder.set_hold(false);
                self.writeln("$X");
                Ok(())
            }
            "reset" => {
                self.fire_event("reset");
                self.stop_workflow();
                self.feeder.clear();
                self.feeder.set_hold(false);
                self.actions.clear();
                self.write_realtime(CMD_RESET);
                Ok(())
            }
            "feedOverride" => {
                self.fire_event("feedOverride");
                let byte = match arg_i64(name, args, 0)? {
                    0 => CMD_FEED_OVR_RESET,
                    10 => CMD_FEED_OVR_COARSE_PLUS,
                    -10 => CMD_FEED_OVR_COARSE_MINUS,
                    1 => CMD_FEED_OVR_FINE_PLUS,
                    -1 => CMD_FEED_OVR_FINE_MINUS,
                    v => {
                        return Err(invalid_arg(name, format!("unsupported step {}", v)));
                    }
                };
                self.write_realtime(byte);
                Ok(())
            }
            "spindleOverride" => {
                self.fire_event("spindleOverride");
                let byte = match arg_i64(name, args, 0)? {
                    0 => CMD_SPINDLE_OVR_RESET,
                    10 => CMD_SPINDLE_OVR_COARSE_PLUS,
                    -10 => CMD_SPINDLE_OVR_COARSE_MINUS,
                    1 => CMD_SPINDLE_OVR_FINE_PLUS,
                    -1 => CMD_SPINDLE_OVR_FINE_MINUS,
                    v => {
                        return Err(invalid_arg(name, format!("unsupported step {}", v)));
                    }
                };
                self.write_realtime(byte);
                Ok(())
            }
            "rapidOverride" => {
                self.fire_event("rapidOverride");
                let byte = match arg_i64(name, args, 0)? {
                    0 | 100 => CMD_RAPID_OVR_RESET,
                    50 => CMD_RAPID_OVR_MEDIUM,
                    25 => CMD_RAPID_OVR_LOW,
                    v => {
                        return Err(invalid_arg(name, format!("unsupported level {}", v)));
                    }
                };
                self.write_realtime(byte);
                Ok(())
            }
            "lasertest:on" => {
                self.fire_event("lasertest:on");
                let power = arg_f64(name, args, 0)?;
                let duration = opt_f64(args, 1).unwrap_or(0.0);
                let mut lines = vec!["G1F1".to_string(), format!("M3S{}", power.abs())];
                if duration > 0.0 {
                    lines.push(format!("G4P{}", duration / 1000.0));
                    lines.push("M5S0".to_string());
                }
                self.enqueue_gcode(&lines.join("\n"), Context::new());
                Ok(())
            }
            "lasertest:off" => {
                self.fire_event("lasertest:off");
                self.enqueue_gcode("M5S0", Context::new());
                Ok(())
            }
            "gcode" => {
                self.fire_event("gcode");
                let (gcode, context) = gather_gcode_args(args);
                self.enqueue_gcode(&gcode, context);
                Ok(())
            }
            "macro:run" => {
                let id = arg_str(name, args, 0)?;
                let context = arg_context(args, 1);
                let m = self.find_macro(&id)?;
                self.fire_event("macro:run");
                self.enqueue_gcode(&m.content, context);
                Ok(())
            }
            "macro:load" => {
                let id = arg_str(name, args, 0)?;
                let context = arg_context(args, 1);
                let m = self.find_macro(&id)?;
                self.fire_event("macro:load");
                self.load_program(&m.name, &m.content, context)
            }
            "watchdir:load" => {
                self.fire_event("watchdir:load");
                let file = arg_str(name, args, 0)?;
                let data = self.monitor.read_file(Path::new(&file))?;
                self.load_program(&file, &data, Context::new())
            }
            "jog" => {
                self.fire_event("jog");
                let axis = arg_str(name, args, 0)?;
                let distance = arg_f64(name, args, 1)?;
                let feed = arg_f64(name, args, 2)?;
                self.writeln(&format!("$J=G91 G0 {}{} F{:.0}", axis, distance, feed));
                Ok(())
            }
            "jog:cancel" => {
                self.fire_event("jog:cancel");
                self.write_realtime(CMD_JOG_CANCEL);
                Ok(())
            }
            "start" | "stop" | "pause" | "resume" => {
                let replacement = format!("gcode:{}", name);
                tracing::warn!("Command '{}' is deprecated, use '{}'", name, replacement);
                self.command(client, &replacement, args)
            }
            _ => {
                tracing::error!("Unknown command: {}", name);
                Err(CommandError::UnknownCommand {
                    name: name.to_string(),
                }
                .into())
            }
        }
    }

    fn find_macro(&self, id: &str) -> Result<grblhub_core::MacroDef> {
        self.config
            .macros()
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| {
                CommandError::MacroNotFound { id: id.to_string() }.into()
            })
    }

    fn load_program(&mut self, name: &str, gcode: &str, context: Context) -> Result<()> {
        // A load-time context is applied eagerly to the stored program
        let prepared = if context.is_empty() {
            gcode.to_string()
        } else {
            gcode
                .lines()
                .map(|line| self.translate(line, &context))
                .collect::<Vec<_>>()
                .join("\n")
        };

        if !self.sender.load(name, &prepared, context) {
            return Err(CommandError::InvalidProgram {
                reason: "empty program".to_string(),
            }
            .into());
        }
        self.stop_workflow();

        let status = self.sender.status();
        self.emit(&ControllerEvent::SenderStatus(status.clone()));
        self.last_emitted_sender = Some(status);
        Ok(())
    }

    fn stop_workflow(&mut self) {
        if self.workflow.stop() {
            self.sender.rewind();
        }
    }

    fn stop_streaming(&mut self) {
        let was_run = self.parser.state().active_state == ActiveState::Run;
        self.stop_workflow();
        if was_run {
            // Hold first so motion decelerates, then soft-reset to flush the
            // planner once the machine has settled
            self.write_realtime(CMD_FEED_HOLD);
            let due = self.clock.now_millis() + STOP_RESET_DELAY_MS;
            self.delayed_writes.push((due, CMD_RESET));
        }
    }

    fn fire_event(&mut self, event: &str) {
        match self.event_trigger.lookup(event) {
            Some(TriggeredAction::System(command)) => {
                if let Err(e) = self.task_runner.run(&command) {
                    tracing::error!("Event '{}' task failed: {}", event, e);
                }
            }
            Some(TriggeredAction::Gcode(gcode)) => {
                self.enqueue_gcode(&gcode, Context::new());
            }
            None => {}
        }
    }

    fn enqueue_gcode(&mut self, gcode: &str, context: Context) {
        let lines: Vec<String> = gcode
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();
        if lines.is_empty() {
            return;
        }

        let count = lines.len();
        let was_pending = self.feeder.is_pending();
        if self.feeder.feed(lines, context) == 0 {
            tracing::warn!(
                "Feeder is holding (alarm lockout), dropped {} line(s)",
                count
            );
            return;
        }
        if !was_pending {
            self.pump_feeder();
        }
    }

    // ------------------------------------------------------------------
    // Accessors

    /// Last-known machine state.
    pub fn state(&self) -> &MachineState {
        self.parser.state()
    }

    pub fn ready(&self) -> bool {
        self.ready
    }

    pub fn options(&self) -> &SerialOptions {
        &self.options
    }

    pub fn feeder(&self) -> &Feeder {
        &self.feeder
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }
}

// ----------------------------------------------------------------------
// Argument helpers

fn invalid_arg(name: &str, reason: String) -> grblhub_core::Error {
    CommandError::InvalidArgument {
        name: name.to_string(),
        reason,
    }
    .into()
}

fn arg_str(name: &str, args: &[Value], index: usize) -> Result<String> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| invalid_arg(name, format!("missing string argument {}", index)))
}

fn arg_f64(name: &str, args: &[Value], index: usize) -> Result<f64> {
    args.get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| invalid_arg(name, format!("missing numeric argument {}", index)))
}

fn arg_i64(name: &str, args: &[Value], index: usize) -> Result<i64> {
    args.get(index)
        .and_then(Value::as_i64)
        .ok_or_else(|| invalid_arg(name, format!("missing integer argument {}", index)))
}

fn opt_f64(args: &[Value], index: usize) -> Option<f64> {
    args.get(index).and_then(Value::as_f64)
}

fn arg_context(args: &[Value], index: usize) -> Context {
    args.get(index)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Collect the `gcode` command's argument list: string/array arguments are
/// joined with newlines, a trailing object is the expression context.
fn gather_gcode_args(args: &[Value]) -> (String, Context) {
    let mut parts: Vec<String> = Vec::new();
    let mut context = Context::new();
    for value in args {
        match value {
            Value::String(s) => parts.push(s.clone()),
            Value::Array(items) => {
                parts.extend(items.iter().filter_map(Value::as_str).map(str::to_string));
            }
            Value::Object(map) => context = map.clone(),
            _ => {}
        }
    }
    (parts.join("\n"), context)
}
