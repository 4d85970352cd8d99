//! # grblhub
//!
//! A host-side streaming controller for Grbl CNC and laser machines:
//! - Streams G-code programs under character-counting flow control that
//!   never overruns the firmware's receive buffer
//! - Interleaves ad-hoc lines, realtime commands, macros, and overrides
//! - Fans parsed telemetry out to any number of subscribed clients
//!
//! ## Architecture
//!
//! grblhub is organized as a workspace with multiple crates:
//!
//! 1. **grblhub-core** - Shared types, errors, evaluator, collaborator traits
//! 2. **grblhub-communication** - Line parser, feeder, sender, workflow, controller
//! 3. **grblhub-settings** - File-backed configuration (serial, macros, events)
//! 4. **grblhub** - Main binary wiring the controller onto a tokio runtime

pub mod service;

pub use grblhub_communication::{
    GrblController, LineParser, SerialOptions, SerialTransport, Transport,
};
pub use grblhub_core::{
    ActiveState, Clock, ControllerEvent, Error, EventSink, MachineState, Result,
};
pub use grblhub_settings::{Config, FileConfigStore};

/// Initialize the global tracing subscriber.
///
/// Honors `RUST_LOG`; defaults to `info` when unset.
pub fn init_logging() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    Ok(())
}
