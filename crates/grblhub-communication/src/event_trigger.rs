//! Event trigger: lifecycle events mapped to configured command lists.
//!
//! Hooks come from the configuration store. A hook either enqueues G-code
//! back through the controller or hands a command string to the external
//! task runner. Missing triggers are silently ignored.

use grblhub_core::{EventHook, TriggerKind};
use std::collections::HashMap;

/// The action configured for a fired event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggeredAction {
    /// Enqueue these newline-separated lines as G-code
    Gcode(String),
    /// Run this command string through the task runner
    System(String),
}

/// Lookup table from event name to configured action.
#[derive(Debug, Default)]
pub struct EventTrigger {
    hooks: HashMap<String, EventHook>,
}

impl EventTrigger {
    pub fn new(hooks: Vec<EventHook>) -> Self {
        let mut map = HashMap::new();
        for hook in hooks {
            map.insert(hook.event.clone(), hook);
        }
        Self { hooks: map }
    }

    /// The action for `event`, or `None` when no enabled hook exists.
    pub fn lookup(&self, event: &str) -> Option<TriggeredAction> {
        let hook = self.hooks.get(event)?;
        if !hook.enabled || hook.commands.trim().is_empty() {
            return None;
        }
        Some(match hook.trigger {
            TriggerKind::Gcode => TriggeredAction::Gcode(hook.commands.clone()),
            TriggerKind::System => TriggeredAction::System(hook.commands.clone()),
        })
    }
}
