//! Settings error type.

use thiserror::Error;

/// Errors from loading or saving the configuration document.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document did not parse
    #[error("Failed to parse {path}: {reason}")]
    Parse {
        /// The file that failed to parse.
        path: String,
        /// The parser's reason.
        reason: String,
    },
}

/// Result type using SettingsError
pub type Result<T> = std::result::Result<T, SettingsError>;
