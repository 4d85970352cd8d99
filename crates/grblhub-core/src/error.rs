//! Error handling for grblhub
//!
//! Provides error types for all layers of the controller:
//! - Connection errors (serial port lifecycle and I/O)
//! - Command errors (client-facing command surface)
//! - Evaluation errors (inline bracket expressions)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Represents errors related to the serial link between the host and
/// the Grbl firmware.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Port is not open
    #[error("Port not open: {port}")]
    NotOpen {
        /// The port that was expected to be open.
        port: String,
    },

    /// Port is already open
    #[error("Port already open: {port}")]
    AlreadyOpen {
        /// The port that is already open.
        port: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Write to the port failed
    #[error("Write failed on {port}: {reason}")]
    WriteFailed {
        /// The port the write was issued on.
        port: String,
        /// The reason the write failed.
        reason: String,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },
}

/// Command error type
///
/// Represents failures of the client command surface. These never abort the
/// stream; the offending command is dropped and the error is returned to
/// the caller.
#[derive(Error, Debug, Clone)]
pub enum CommandError {
    /// Unknown command name
    #[error("Unknown command: {name}")]
    UnknownCommand {
        /// The command name that was not recognized.
        name: String,
    },

    /// Missing or malformed command argument
    #[error("Invalid argument for {name}: {reason}")]
    InvalidArgument {
        /// The command the argument belongs to.
        name: String,
        /// The reason the argument is invalid.
        reason: String,
    },

    /// Program failed to load
    #[error("Invalid G-code program: {reason}")]
    InvalidProgram {
        /// The reason the program was rejected.
        reason: String,
    },

    /// Macro id not found in the configuration store
    #[error("Macro not found: {id}")]
    MacroNotFound {
        /// The macro id that was requested.
        id: String,
    },

    /// Watch-directory file could not be read
    #[error("Failed to read {file}: {reason}")]
    FileReadFailed {
        /// The file that was requested.
        file: String,
        /// The reason the read failed.
        reason: String,
    },
}

/// Main error type for grblhub
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Command error
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a command error
    pub fn is_command_error(&self) -> bool {
        matches!(self, Error::Command(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
