//! # grblhub-settings
//!
//! File-backed configuration for grblhub: serial connection defaults, the
//! user macro library, and lifecycle event hooks. Implements the core
//! `ConfigSource` trait consumed by the controller.

pub mod config;
pub mod error;
pub mod store;

pub use config::{Config, SerialSettings};
pub use error::SettingsError;
pub use store::FileConfigStore;
