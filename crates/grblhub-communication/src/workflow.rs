//! Workflow: the three-state gate over the sender.
//!
//! Only while RUNNING does the sender turn acknowledgements into forward
//! progress. Transitions from a disallowed source state are ignored.

use serde::{Deserialize, Serialize};

/// High-level streaming state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    /// No program running
    #[default]
    Idle,
    /// Program suspended; in-flight lines keep their window slots
    Paused,
    /// Program streaming
    Running,
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Paused => write!(f, "paused"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// The workflow state machine.
#[derive(Debug, Default)]
pub struct Workflow {
    state: WorkflowState,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == WorkflowState::Idle
    }

    pub fn is_running(&self) -> bool {
        self.state == WorkflowState::Running
    }

    /// IDLE -> RUNNING. Returns whether the transition happened.
    pub fn start(&mut self) -> bool {
        if self.state == WorkflowState::Idle {
            self.state = WorkflowState::Running;
            tracing::debug!("Workflow: start");
            return true;
        }
        false
    }

    /// RUNNING -> PAUSED.
    pub fn pause(&mut self) -> bool {
        if self.state == WorkflowState::Running {
            self.state = WorkflowState::Paused;
            tracing::debug!("Workflow: pause");
            return true;
        }
        false
    }

    /// PAUSED -> RUNNING.
    pub fn resume(&mut self) -> bool {
        if self.state == WorkflowState::Paused {
            self.state = WorkflowState::Running;
            tracing::debug!("Workflow: resume");
            return true;
        }
        false
    }

    /// Any state -> IDLE. A redundant stop from IDLE is a no-op.
    pub fn stop(&mut self) -> bool {
        if self.state != WorkflowState::Idle {
            self.state = WorkflowState::Idle;
            tracing::debug!("Workflow: stop");
            return true;
        }
        false
    }
}
