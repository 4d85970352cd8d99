//! End-to-end tests for the controller over a mock transport.
//!
//! Input bytes are injected with `on_serial_data`, time is driven by a
//! `ManualClock`, and every byte the controller writes is captured.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use grblhub_communication::controller::GrblController;
use grblhub_communication::transport::{SerialOptions, Transport};
use grblhub_communication::WorkflowState;
use grblhub_core::{
    ConfigSource, ControllerEvent, EventHook, FileMonitorTrait, MacroDef, ManualClock, Result,
    TaskRunnerTrait, TriggerKind,
};
use serde_json::json;

#[derive(Clone, Default)]
struct MockTransport {
    open: Arc<AtomicBool>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Transport for MockTransport {
    fn open(&mut self, _options: &SerialOptions) -> Result<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.written.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    fn try_read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }
}

struct Harness {
    controller: GrblController,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    clock: Arc<ManualClock>,
    events: Arc<Mutex<Vec<ControllerEvent>>>,
}

impl Harness {
    fn new() -> Self {
        let transport = MockTransport::default();
        let written = transport.written.clone();
        let clock = Arc::new(ManualClock::new());

        let mut controller = GrblController::new(
            SerialOptions::new("/dev/ttyUSB0"),
            Box::new(transport),
        )
        .with_clock(clock.clone());
        controller.open().expect("open mock transport");

        let events: Arc<Mutex<Vec<ControllerEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let capture = events.clone();
        controller.add_connection(
            "test-client",
            Box::new(move |event: &ControllerEvent| {
                capture.lock().unwrap().push(event.clone());
            }),
        );

        Self {
            controller,
            written,
            clock,
            events,
        }
    }

    /// Feed the startup banner so the controller becomes ready.
    fn boot(&mut self) {
        self.controller
            .on_serial_data(b"Grbl 1.1h ['$' for help]\n");
        assert!(self.controller.ready());
    }

    fn writes(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    fn write_strings(&self) -> Vec<String> {
        self.writes()
            .iter()
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect()
    }

    fn clear_writes(&self) {
        self.written.lock().unwrap().clear();
    }

    fn reads(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                ControllerEvent::SerialPortRead(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }
}

// ----------------------------------------------------------------------
// Scenario: window accounting

#[test]
fn test_window_accounting() {
    let mut h = Harness::new();
    h.boot();

    // Five 28-byte lines cost 29 each with the newline. Four fill 116 of
    // the 120-byte window; the fifth must wait for an acknowledgement.
    let line = "G1 X123.456 Y789.012 F1500.0";
    assert_eq!(line.len(), 28);
    let gcode = vec![line; 5].join("\n");

    h.controller
        .command("t", "gcode:load", &[json!("job"), json!(gcode)])
        .unwrap();
    h.clear_writes();
    h.controller.command("t", "gcode:start", &[]).unwrap();

    assert_eq!(h.controller.sender().sent(), 4);
    assert_eq!(h.controller.sender().data_length(), 116);
    assert_eq!(h.writes().len(), 4);

    // One ok: line 1 acknowledged, line 5 admitted greedily
    h.controller.on_serial_data(b"ok\n");
    assert_eq!(h.controller.sender().received(), 1);
    assert_eq!(h.controller.sender().sent(), 5);
    assert_eq!(h.controller.sender().data_length(), 116);

    for _ in 0..4 {
        h.controller.on_serial_data(b"ok\n");
    }
    assert_eq!(h.controller.sender().received(), 5);
    assert_eq!(h.controller.sender().data_length(), 0);
    assert_eq!(h.controller.workflow().state(), WorkflowState::Running);
}

// ----------------------------------------------------------------------
// Scenario: realtime overlay

#[test]
fn test_status_poll_does_not_disturb_window() {
    let mut h = Harness::new();
    h.boot();

    h.controller
        .command("t", "gcode:load", &[json!("job"), json!("G0 X1\nG1 Y2\nM30")])
        .unwrap();
    h.controller.command("t", "gcode:start", &[]).unwrap();

    let dl_before = h.controller.sender().data_length();
    let window_before = h.controller.sender().buffer_size();

    // The poller emits `?`; neither the poll byte nor its reply touches
    // the window accounting.
    h.controller.tick();
    assert_eq!(h.controller.sender().data_length(), dl_before);

    h.controller
        .on_serial_data(b"<Run|MPos:0.000,0.000,0.000|Bf:14,100>\n");
    assert_eq!(h.controller.sender().data_length(), dl_before);
    // growth is forbidden while a program is in flight
    assert_eq!(h.controller.sender().buffer_size(), window_before);

    // Program acknowledgements keep consuming in FIFO order
    h.controller.on_serial_data(b"ok\nok\n");
    h.controller
        .on_serial_data(b"<Run|MPos:1.000,0.000,0.000>\n");
    h.controller.on_serial_data(b"ok\n");
    assert_eq!(h.controller.sender().received(), 3);
    assert_eq!(h.controller.sender().data_length(), 0);
}

// ----------------------------------------------------------------------
// Scenario: stop during Run

#[test]
fn test_stop_during_run_holds_then_resets() {
    let mut h = Harness::new();
    h.boot();

    h.controller
        .command("t", "gcode:load", &[json!("job"), json!("G1 X100 F100")])
        .unwrap();
    h.controller.command("t", "gcode:start", &[]).unwrap();
    h.controller
        .on_serial_data(b"<Run|MPos:1.000,0.000,0.000>\n");

    h.clear_writes();
    h.controller.command("t", "gcode:stop", &[]).unwrap();

    // workflow idles immediately and the hold goes out synchronously
    assert_eq!(h.controller.workflow().state(), WorkflowState::Idle);
    assert_eq!(h.writes(), vec![vec![b'!']]);

    // the soft reset fires once 500 ms have elapsed
    h.clear_writes();
    h.clock.advance(250);
    h.controller.tick();
    assert!(!h.writes().contains(&vec![0x18]));

    h.clock.advance(250);
    h.controller.tick();
    assert!(h.writes().contains(&vec![0x18]));
}

// ----------------------------------------------------------------------
// Scenario: expression substitution

#[test]
fn test_expression_substitution() {
    let mut h = Harness::new();
    h.controller
        .on_serial_data(b"<Idle|WPos:10.000,20.000,0.000>\n");

    let mut context = grblhub_core::Context::new();
    context.insert("xmax".to_string(), json!(50));
    // posx/posy override any caller value
    context.insert("posx".to_string(), json!(99));

    let out = h
        .controller
        .translate("G0 X[posx - 8] Y[ymax]", &context);
    assert_eq!(out, "G0 X2 Y0");
}

#[test]
fn test_translate_identity_without_brackets() {
    let h = Harness::new();
    let line = "G1 X10 Y20 F1000";
    assert_eq!(
        h.controller.translate(line, &grblhub_core::Context::new()),
        line
    );
}

#[test]
fn test_failed_expression_left_unsubstituted() {
    let h = Harness::new();
    let line = "G0 X[bogus + 1]";
    assert_eq!(
        h.controller.translate(line, &grblhub_core::Context::new()),
        line
    );
}

// ----------------------------------------------------------------------
// Scenario: alarm halts the feeder

#[test]
fn test_alarm_halts_feeder() {
    let mut h = Harness::new();
    h.boot();

    h.controller.on_serial_data(b"ALARM:1\n");
    assert!(h.controller.feeder().is_held());

    h.clear_writes();
    h.controller
        .command("t", "gcode", &[json!("G0 X5")])
        .unwrap();

    // dropped: nothing queued, no bytes on the wire
    assert!(!h.controller.feeder().is_pending());
    assert!(h.writes().is_empty());

    // unlock releases the hold
    h.controller.command("t", "unlock", &[]).unwrap();
    h.controller
        .command("t", "gcode", &[json!("G0 X5")])
        .unwrap();
    assert!(h.write_strings().contains(&"G0 X5\n".to_string()));
}

// ----------------------------------------------------------------------
// Scenario: stall recovery

#[test]
fn test_status_query_stall_recovery() {
    let mut h = Harness::new();
    h.boot();

    h.clear_writes();
    h.controller.tick();
    let first: Vec<String> = h.write_strings();
    assert!(first.contains(&"?".to_string()));
    assert!(first.contains(&"$G\n".to_string()));

    // unanswered for 5001 ms: the flag is cleared and a fresh `?` issued
    h.clear_writes();
    h.clock.advance(5001);
    h.controller.tick();
    assert_eq!(h.write_strings(), vec!["?".to_string()]);
}

#[test]
fn test_parser_state_stall_recovery() {
    let mut h = Harness::new();
    h.boot();

    h.controller.tick();

    // the $G exchange never completes; after 10 s it is abandoned and the
    // next tick may reissue
    h.clock.advance(10_001);
    h.controller.tick();
    h.clear_writes();
    h.clock.advance(250);
    h.controller.tick();
    assert!(h.write_strings().contains(&"$G\n".to_string()));
}

#[test]
fn test_parser_state_poll_throttled() {
    let mut h = Harness::new();
    h.boot();

    h.clear_writes();
    h.controller.tick();
    // answer both polls immediately
    h.controller
        .on_serial_data(b"<Idle|MPos:0.000,0.000,0.000>\n");
    h.controller
        .on_serial_data(b"[GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0]\nok\n");

    // 250 ms later the status poll repeats but $G stays throttled
    h.clock.advance(250);
    h.clear_writes();
    h.controller.tick();
    let writes = h.write_strings();
    assert!(writes.contains(&"?".to_string()));
    assert!(!writes.contains(&"$G\n".to_string()));

    // past the 500 ms throttle it goes out again
    h.controller.on_serial_data(b"<Idle|MPos:0.000,0.000,0.000>\n");
    h.clock.advance(250);
    h.clear_writes();
    h.controller.tick();
    assert!(h.write_strings().contains(&"$G\n".to_string()));
}

// ----------------------------------------------------------------------
// Acknowledgement routing

#[test]
fn test_ok_routed_to_feeder_when_idle() {
    let mut h = Harness::new();
    h.boot();

    h.controller
        .command("t", "gcode", &[json!("G0 X1\nG0 X2")])
        .unwrap();
    // first line pumped immediately, second waits for its ok
    assert!(h.write_strings().contains(&"G0 X1\n".to_string()));
    assert_eq!(h.controller.feeder().status().queued, 1);

    h.controller.on_serial_data(b"ok\n");
    assert!(h.write_strings().contains(&"G0 X2\n".to_string()));
    assert!(h.reads().contains(&"ok".to_string()));
}

#[test]
fn test_error_during_run_reports_offending_line() {
    let mut h = Harness::new();
    h.boot();

    h.controller
        .command("t", "gcode:load", &[json!("job"), json!("G1 X10\nG1 X20")])
        .unwrap();
    h.controller.command("t", "gcode:start", &[]).unwrap();

    h.controller.on_serial_data(b"error:20\n");
    let reads = h.reads();
    assert!(reads.contains(&"> G1 X10 (line 1)".to_string()));
    assert!(reads.contains(&"error:20 (Unsupported command)".to_string()));
    // the error consumed the acknowledgement slot
    assert_eq!(h.controller.sender().received(), 1);
}

#[test]
fn test_user_status_report_is_echoed() {
    let mut h = Harness::new();
    h.boot();

    h.controller.command("t", "statusreport", &[]).unwrap();
    h.controller
        .on_serial_data(b"<Idle|MPos:0.000,0.000,0.000>\n");
    assert!(h
        .reads()
        .iter()
        .any(|line| line.starts_with("<Idle|MPos:")));

    // polled reports are not echoed
    let count = h.reads().len();
    h.controller.tick();
    h.controller
        .on_serial_data(b"<Idle|MPos:0.000,0.000,0.000>\n");
    assert_eq!(h.reads().len(), count);
}

#[test]
fn test_user_parser_state_exchange_is_echoed() {
    let mut h = Harness::new();
    h.boot();

    h.controller.command("t", "gcode", &[json!("$G")]).unwrap();
    h.controller
        .on_serial_data(b"[GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0]\nok\n");

    let reads = h.reads();
    assert!(reads
        .iter()
        .any(|line| line.starts_with("[GC:")));
    // the trailing ok completes the exchange for the client
    assert!(reads.contains(&"ok".to_string()));
    // and was not treated as a feeder/sender acknowledgement
    assert_eq!(h.controller.sender().received(), 0);
}

#[test]
fn test_startup_clears_action_flags() {
    let mut h = Harness::new();
    h.boot();
    h.controller.tick();

    // both queries are outstanding; a reset banner wipes them
    h.controller.on_serial_data(b"Grbl 1.1h ['$' for help]\n");
    h.clear_writes();
    h.controller.tick();
    let writes = h.write_strings();
    assert!(writes.contains(&"?".to_string()));
    assert!(writes.contains(&"$G\n".to_string()));
}

#[test]
fn test_window_grows_only_when_idle() {
    let mut h = Harness::new();
    h.boot();

    h.controller
        .on_serial_data(b"<Idle|MPos:0.000,0.000,0.000|Bf:15,256>\n");
    assert_eq!(h.controller.sender().buffer_size(), 248);
}

#[test]
fn test_settings_line_annotated() {
    let mut h = Harness::new();
    h.boot();
    h.controller.on_serial_data(b"$110=1000.000\n");
    assert!(h
        .reads()
        .contains(&"$110=1000.000 (X-axis maximum rate)".to_string()));
}

// ----------------------------------------------------------------------
// Command surface

#[test]
fn test_override_commands() {
    let mut h = Harness::new();
    h.boot();
    h.clear_writes();

    h.controller
        .command("t", "feedOverride", &[json!(10)])
        .unwrap();
    h.controller
        .command("t", "spindleOverride", &[json!(-1)])
        .unwrap();
    h.controller
        .command("t", "rapidOverride", &[json!(50)])
        .unwrap();

    assert_eq!(h.writes(), vec![vec![0x91], vec![0x9d], vec![0x96]]);

    assert!(h
        .controller
        .command("t", "feedOverride", &[json!(42)])
        .is_err());
}

#[test]
fn test_lasertest_feeds_program() {
    let mut h = Harness::new();
    h.boot();
    h.clear_writes();

    h.controller
        .command("t", "lasertest:on", &[json!(50), json!(2000)])
        .unwrap();

    // first line goes out immediately, the rest queue behind its ok
    assert!(h.write_strings().contains(&"G1F1\n".to_string()));
    assert_eq!(h.controller.feeder().status().queued, 3);

    h.controller.on_serial_data(b"ok\n");
    assert!(h.write_strings().contains(&"M3S50\n".to_string()));
    h.controller.on_serial_data(b"ok\n");
    assert!(h.write_strings().contains(&"G4P2\n".to_string()));
    h.controller.on_serial_data(b"ok\n");
    assert!(h.write_strings().contains(&"M5S0\n".to_string()));
}

#[test]
fn test_homing_and_unlock_and_sleep() {
    let mut h = Harness::new();
    h.boot();
    h.clear_writes();

    h.controller.command("t", "homing", &[]).unwrap();
    h.controller.command("t", "unlock", &[]).unwrap();
    h.controller.command("t", "sleep", &[]).unwrap();

    let writes = h.write_strings();
    assert_eq!(writes, vec!["$H\n", "$X\n", "$SLP\n"]);
}

#[test]
fn test_reset_clears_everything() {
    let mut h = Harness::new();
    h.boot();

    h.controller.on_serial_data(b"ALARM:2\n");
    h.controller
        .command("t", "gcode:load", &[json!("job"), json!("G0 X1")])
        .unwrap();
    h.controller.command("t", "gcode:start", &[]).unwrap();

    h.clear_writes();
    h.controller.command("t", "reset", &[]).unwrap();

    assert!(h.writes().contains(&vec![0x18]));
    assert_eq!(h.controller.workflow().state(), WorkflowState::Idle);
    assert!(!h.controller.feeder().is_held());
    assert_eq!(h.controller.sender().sent(), 0);
}

#[test]
fn test_deprecated_aliases() {
    let mut h = Harness::new();
    h.boot();

    h.controller
        .command("t", "gcode:load", &[json!("job"), json!("G0 X1")])
        .unwrap();
    h.controller.command("t", "start", &[]).unwrap();
    assert_eq!(h.controller.workflow().state(), WorkflowState::Running);
    h.controller.command("t", "stop", &[]).unwrap();
    assert_eq!(h.controller.workflow().state(), WorkflowState::Idle);
}

#[test]
fn test_unknown_command_is_an_error() {
    let mut h = Harness::new();
    assert!(h.controller.command("t", "warp:drive", &[]).is_err());
}

#[test]
fn test_jog_commands() {
    let mut h = Harness::new();
    h.boot();
    h.clear_writes();

    h.controller
        .command("t", "jog", &[json!("X"), json!(-2.5), json!(500.0)])
        .unwrap();
    assert!(h
        .write_strings()
        .contains(&"$J=G91 G0 X-2.5 F500\n".to_string()));

    h.controller.command("t", "jog:cancel", &[]).unwrap();
    assert!(h.writes().contains(&vec![0x85]));
}

#[test]
fn test_load_with_context_translates_eagerly() {
    let mut h = Harness::new();
    h.controller
        .on_serial_data(b"<Idle|WPos:10.000,0.000,0.000>\n");

    let context = json!({"safe_z": 5});
    h.controller
        .command(
            "t",
            "gcode:load",
            &[json!("job"), json!("G0 Z[safe_z]\nG0 X[posx + 1]"), context],
        )
        .unwrap();

    h.clear_writes();
    h.controller.command("t", "gcode:start", &[]).unwrap();
    let writes = h.write_strings();
    assert!(writes.contains(&"G0 Z5\n".to_string()));
    assert!(writes.contains(&"G0 X11\n".to_string()));
}

#[test]
fn test_gcode_start_clears_feeder() {
    let mut h = Harness::new();
    h.boot();

    h.controller
        .command("t", "gcode", &[json!("G4 P1\nG4 P2\nG4 P3")])
        .unwrap();
    assert!(h.controller.feeder().is_pending());

    h.controller
        .command("t", "gcode:load", &[json!("job"), json!("G0 X1")])
        .unwrap();
    h.controller.command("t", "gcode:start", &[]).unwrap();
    assert!(!h.controller.feeder().is_pending());
}

#[test]
fn test_pause_resume_cycle() {
    let mut h = Harness::new();
    h.boot();

    h.controller
        .command("t", "gcode:load", &[json!("job"), json!("G0 X1\nG0 X2")])
        .unwrap();
    h.controller.command("t", "gcode:start", &[]).unwrap();

    h.clear_writes();
    h.controller.command("t", "gcode:pause", &[]).unwrap();
    assert_eq!(h.controller.workflow().state(), WorkflowState::Paused);
    assert!(h.writes().contains(&vec![b'!']));

    // acknowledgements while paused do not advance the program
    h.controller.on_serial_data(b"ok\n");
    assert_eq!(h.controller.sender().received(), 0);

    h.clear_writes();
    h.controller.command("t", "gcode:resume", &[]).unwrap();
    assert_eq!(h.controller.workflow().state(), WorkflowState::Running);
    assert!(h.writes().contains(&vec![b'~']));
}

// ----------------------------------------------------------------------
// Collaborators

struct TestConfig {
    macros: Vec<MacroDef>,
    hooks: Vec<EventHook>,
}

impl ConfigSource for TestConfig {
    fn macros(&self) -> Vec<MacroDef> {
        self.macros.clone()
    }

    fn event_hooks(&self) -> Vec<EventHook> {
        self.hooks.clone()
    }
}

struct TestRunner {
    commands: Arc<Mutex<Vec<String>>>,
}

impl TaskRunnerTrait for TestRunner {
    fn run(&self, command: &str) -> Result<()> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(())
    }
}

struct TestMonitor;

impl FileMonitorTrait for TestMonitor {
    fn read_file(&self, path: &Path) -> Result<String> {
        if path == Path::new("job.nc") {
            Ok("G0 X1\nG0 X2".to_string())
        } else {
            Err(grblhub_core::CommandError::FileReadFailed {
                file: path.display().to_string(),
                reason: "not found".to_string(),
            }
            .into())
        }
    }
}

fn harness_with_collaborators(ran: Arc<Mutex<Vec<String>>>) -> Harness {
    let transport = MockTransport::default();
    let written = transport.written.clone();
    let clock = Arc::new(ManualClock::new());

    let config = TestConfig {
        macros: vec![MacroDef {
            id: "m1".to_string(),
            name: "Zero XY".to_string(),
            content: "G92 X0 Y0".to_string(),
        }],
        hooks: vec![
            EventHook {
                event: "homing".to_string(),
                trigger: TriggerKind::System,
                commands: "beep.sh".to_string(),
                enabled: true,
            },
            EventHook {
                event: "unlock".to_string(),
                trigger: TriggerKind::System,
                commands: "unlocked.sh".to_string(),
                enabled: true,
            },
        ],
    };

    let mut controller =
        GrblController::new(SerialOptions::new("/dev/ttyUSB0"), Box::new(transport))
            .with_clock(clock.clone())
            .with_config(Arc::new(config))
            .with_task_runner(Arc::new(TestRunner {
                commands: ran.clone(),
            }))
            .with_file_monitor(Arc::new(TestMonitor));
    controller.open().unwrap();

    let events: Arc<Mutex<Vec<ControllerEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let capture = events.clone();
    controller.add_connection(
        "test-client",
        Box::new(move |event: &ControllerEvent| {
            capture.lock().unwrap().push(event.clone());
        }),
    );

    Harness {
        controller,
        written,
        clock,
        events,
    }
}

#[test]
fn test_macro_run_and_load() {
    let ran = Arc::new(Mutex::new(Vec::new()));
    let mut h = harness_with_collaborators(ran);
    h.boot();
    h.clear_writes();

    h.controller
        .command("t", "macro:run", &[json!("m1")])
        .unwrap();
    assert!(h.write_strings().contains(&"G92 X0 Y0\n".to_string()));

    assert!(h
        .controller
        .command("t", "macro:run", &[json!("missing")])
        .is_err());

    h.controller
        .command("t", "macro:load", &[json!("m1")])
        .unwrap();
    assert_eq!(h.controller.sender().total(), 1);
}

#[test]
fn test_watchdir_load() {
    let ran = Arc::new(Mutex::new(Vec::new()));
    let mut h = harness_with_collaborators(ran);
    h.boot();

    h.controller
        .command("t", "watchdir:load", &[json!("job.nc")])
        .unwrap();
    assert_eq!(h.controller.sender().total(), 2);

    assert!(h
        .controller
        .command("t", "watchdir:load", &[json!("missing.nc")])
        .is_err());
}

#[test]
fn test_system_event_hooks_run_tasks() {
    let ran = Arc::new(Mutex::new(Vec::new()));
    let mut h = harness_with_collaborators(ran.clone());
    h.boot();

    h.controller.command("t", "homing", &[]).unwrap();
    assert_eq!(*ran.lock().unwrap(), vec!["beep.sh".to_string()]);
    assert!(h.write_strings().contains(&"$H\n".to_string()));

    // hooks fire before the action for the whole command surface
    h.controller.command("t", "unlock", &[]).unwrap();
    assert_eq!(
        *ran.lock().unwrap(),
        vec!["beep.sh".to_string(), "unlocked.sh".to_string()]
    );
    assert!(h.write_strings().contains(&"$X\n".to_string()));
}

// ----------------------------------------------------------------------
// Connection registry and lifecycle

#[test]
fn test_new_connection_receives_snapshots() {
    let mut h = Harness::new();
    h.controller
        .command("t", "gcode:load", &[json!("job"), json!("G0 X1")])
        .unwrap();

    let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let capture = received.clone();
    h.controller.add_connection(
        "late-client",
        Box::new(move |event: &ControllerEvent| {
            capture.lock().unwrap().push(event.name().to_string());
        }),
    );

    let names = received.lock().unwrap().clone();
    assert_eq!(names, vec!["controller:state", "sender:status"]);
}

#[test]
fn test_close_cancels_everything() {
    let mut h = Harness::new();
    h.boot();
    h.controller
        .command("t", "gcode:load", &[json!("job"), json!("G0 X1")])
        .unwrap();
    h.controller.command("t", "gcode:start", &[]).unwrap();

    h.controller.close().unwrap();
    assert!(!h.controller.is_open());
    assert!(!h.controller.ready());
    assert_eq!(h.controller.workflow().state(), WorkflowState::Idle);
    assert_eq!(h.controller.sender().total(), 0);
    assert_eq!(h.controller.connection_count(), 0);

    // contract violations are errors, not panics
    assert!(h.controller.close().is_err());
    // and ticking a closed controller is a no-op
    h.controller.tick();
}

#[test]
fn test_open_while_open_is_an_error() {
    let mut h = Harness::new();
    assert!(h.controller.open().is_err());
}

#[test]
fn test_tick_emits_state_changes_once() {
    let mut h = Harness::new();
    h.controller
        .on_serial_data(b"<Idle|MPos:1.000,0.000,0.000>\n");

    h.controller.tick();
    let count = |events: &[ControllerEvent]| {
        events
            .iter()
            .filter(|e| matches!(e, ControllerEvent::ControllerState(_)))
            .count()
    };
    let after_first = count(&h.events.lock().unwrap());

    // unchanged state is not re-emitted
    h.controller.tick();
    assert_eq!(count(&h.events.lock().unwrap()), after_first);

    // a position change is
    h.controller
        .on_serial_data(b"<Idle|MPos:2.000,0.000,0.000>\n");
    h.controller.tick();
    assert_eq!(count(&h.events.lock().unwrap()), after_first + 1);
}
