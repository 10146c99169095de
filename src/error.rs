//! Error types and Result aliases for shellbridge

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error as ThisError;

/// Result type alias for shellbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for shellbridge
#[derive(Debug, ThisError)]
pub enum Error {
    // === PTY / channel errors ===
    /// Failed to create PTY
    #[error("Failed to create PTY for shell '{command}': {reason}")]
    PtyCreationFailed { command: String, reason: String },

    /// Failed to spawn the shell in the PTY
    #[error("Failed to spawn shell '{command}': {reason}")]
    CommandSpawnFailed { command: String, reason: String },

    /// Failed to clone PTY reader
    #[error("Failed to clone PTY reader: {reason}")]
    PtyReaderCloneFailed { reason: String },

    /// Failed to take PTY writer
    #[error("Failed to take PTY writer: {reason}")]
    PtyWriterTakeFailed { reason: String },

    /// Failed to send input to PTY
    #[error("Failed to send input to PTY: {reason}")]
    PtyInputSendFailed { reason: String },

    /// Failed to resize PTY
    #[error("Failed to resize PTY to {cols}x{rows}: {reason}")]
    PtyResizeFailed { cols: u16, rows: u16, reason: String },

    /// Failed to terminate the shell process
    #[error("Failed to terminate shell process: {reason}")]
    PtyKillFailed { reason: String },

    // === Session errors ===
    /// No shell session has been created yet
    #[error("No shell session has been created")]
    SessionNotCreated,

    /// The session has been closed or its shell exited
    #[error("Shell session is closed")]
    SessionClosed,

    /// The shell flavor has no sentinel recipe
    #[error("Unsupported shell '{program}': completion detection will be unreliable")]
    UnsupportedShell { program: String },

    /// The sentinel cannot change after it was installed
    #[error("Sentinel is already installed for this session")]
    SentinelAlreadyInstalled,

    // === Execution errors ===
    /// Empty command
    #[error("Command cannot be empty")]
    EmptyCommand,

    /// Waiting for completion gave up; the shell itself is untouched
    #[error("Command '{command}' did not complete within {duration:?}")]
    CommandTimeout { command: String, duration: Duration },

    /// The execution was superseded or the channel closed while waiting
    #[error("Execution of '{command}' was aborted")]
    ExecutionAborted { command: String },

    /// The working directory could not be determined and no previous value is known
    #[error("Current directory unavailable: {reason}")]
    DirectoryUnavailable { reason: String },

    // === Configuration errors ===
    /// Failed to load configuration file
    #[error("Failed to load config from '{}': {reason}", path.display())]
    ConfigLoadFailed { path: PathBuf, reason: String },

    /// Failed to parse configuration
    #[error("Failed to parse {format} config: {reason}")]
    ConfigParseFailed { format: String, reason: String },

    /// Failed to serialize configuration
    #[error("Failed to serialize config as {format}: {reason}")]
    ConfigSerializationFailed { format: String, reason: String },

    /// Configuration validation failed
    #[error("Configuration validation failed for '{field}': {reason}")]
    ConfigValidationFailed { field: String, reason: String },

    // === I/O and serialization errors ===
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Regex compilation errors
    #[error("Regex compilation error: {0}")]
    Regex(#[from] regex::Error),

    // === Generic fallback (use sparingly) ===
    /// Generic errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Whether the error only abandoned a wait and left the shell usable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::CommandTimeout { .. }
                | Error::ExecutionAborted { .. }
                | Error::DirectoryUnavailable { .. }
                | Error::UnsupportedShell { .. }
        )
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Other(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Other(err.to_string())
    }
}
