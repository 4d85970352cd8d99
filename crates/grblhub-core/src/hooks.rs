//! Collaborator traits consumed by the controller.
//!
//! Configuration store, file monitor, and task runner are process-wide
//! collaborators. They are injected at construction rather than reached
//! for as ambient state, which keeps the core testable with fakes.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// A stored user macro.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroDef {
    /// Stable identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// G-code body, possibly multi-line
    pub content: String,
}

/// How an event hook's commands are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Enqueue the commands as G-code through the controller
    Gcode,
    /// Hand the commands to the external task runner
    System,
}

/// A configured lifecycle event hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHook {
    /// Event name (`gcode:start`, `homing`, ...)
    pub event: String,
    /// Dispatch kind
    pub trigger: TriggerKind,
    /// Command string; G-code hooks may contain multiple newline-separated lines
    pub commands: String,
    /// Disabled hooks are skipped
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Read access to the persistent configuration store.
pub trait ConfigSource: Send + Sync {
    /// Stored user macros.
    fn macros(&self) -> Vec<MacroDef> {
        Vec::new()
    }

    /// Configured event hooks.
    fn event_hooks(&self) -> Vec<EventHook> {
        Vec::new()
    }
}

/// Config source with no macros and no hooks.
pub struct NoOpConfigSource;

impl ConfigSource for NoOpConfigSource {}

/// File access for `watchdir:load`.
pub trait FileMonitorTrait: Send + Sync {
    /// Read a G-code file from the watched directory.
    fn read_file(&self, path: &Path) -> Result<String>;
}

/// File monitor that rejects every read.
pub struct NoOpFileMonitor;

impl FileMonitorTrait for NoOpFileMonitor {
    fn read_file(&self, path: &Path) -> Result<String> {
        Err(crate::error::CommandError::FileReadFailed {
            file: path.display().to_string(),
            reason: "no file monitor configured".to_string(),
        }
        .into())
    }
}

/// File monitor rooted at a watch directory on the local filesystem.
pub struct FsFileMonitor {
    root: std::path::PathBuf,
}

impl FsFileMonitor {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileMonitorTrait for FsFileMonitor {
    fn read_file(&self, path: &Path) -> Result<String> {
        let full = self.root.join(path);
        std::fs::read_to_string(&full).map_err(|e| {
            crate::error::CommandError::FileReadFailed {
                file: full.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Executor for system-kind event hooks.
pub trait TaskRunnerTrait: Send + Sync {
    /// Run a shell command string. Fire-and-forget; failures are logged.
    fn run(&self, command: &str) -> Result<()>;
}

/// Task runner that drops every command.
pub struct NoOpTaskRunner;

impl TaskRunnerTrait for NoOpTaskRunner {
    fn run(&self, command: &str) -> Result<()> {
        tracing::debug!("No task runner configured, dropping: {}", command);
        Ok(())
    }
}

/// Task runner spawning commands through the platform shell.
pub struct ShellTaskRunner;

impl TaskRunnerTrait for ShellTaskRunner {
    fn run(&self, command: &str) -> Result<()> {
        tracing::info!("Running task: {}", command);
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = std::process::Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = std::process::Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.spawn().map_err(|e| {
            tracing::error!("Failed to spawn task '{}': {}", command, e);
            crate::error::Error::Io(e)
        })?;
        Ok(())
    }
}
