//! # grblhub-core
//!
//! Core types and collaborator traits shared across the grblhub workspace:
//! machine state, controller events, the error taxonomy, the inline
//! expression evaluator, and the injected clock/config/monitor/runner
//! interfaces.

pub mod clock;
pub mod error;
pub mod evaluator;
pub mod event;
pub mod hooks;
pub mod machine;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CommandError, ConnectionError, Error, Result};
pub use evaluator::{evaluate, EvalError};
pub use event::{ControllerEvent, EventSink, FeederStatus, SenderStatus};
pub use hooks::{
    ConfigSource, EventHook, FileMonitorTrait, FsFileMonitor, MacroDef, NoOpConfigSource,
    NoOpFileMonitor, NoOpTaskRunner, ShellTaskRunner, TaskRunnerTrait, TriggerKind,
};
pub use machine::{ActiveState, BufferCounts, MachineState, Modal, Overrides, Position};

/// Variable context attached to fed lines and loaded programs.
pub type Context = serde_json::Map<String, serde_json::Value>;
