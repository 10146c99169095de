//! shellbridge - drive an interactive shell over a raw byte stream
//!
//! This library runs commands in a persistent, human-visible shell and
//! reads their output back, even though the only connection to the shell is
//! an unframed byte stream full of ANSI escapes that a terminal emulator is
//! rendering at the same time.
//!
//! ## Features
//!
//! - **Completion detection:** An invisible per-session sentinel emitted after every prompt
//! - **Output capture:** Text between the command's echo and the next prompt, with truncation
//! - **Interrupts:** Interrupt-and-drain before every foreground command
//! - **Directory tracking:** Cached working directory with staged recovery
//! - **Shell flavors:** bash, zsh, fish and PowerShell through a profile table
//!
//! ## Module Organization
//!
//! - [`protocol`] - Sentinel installation, completion detection, extraction, sessions
//! - [`pty`] - Byte channel traits, the `portable-pty` implementation, session events
//! - [`terminal`] - Terminal emulator boundary, line scrollback, prompt heuristics
//! - [`ansi`] - Incremental escape sequence stripping
//! - [`models`] - Session and execution state
//! - [`config`] - Configuration loading and validation
//! - [`mod@error`] - Error types and Result aliases
//!
//! ## Quick Start
//!
//! ```no_run
//! use shellbridge::{ExecuteOptions, ShellSessionManager};
//!
//! # async fn run() -> shellbridge::Result<()> {
//! let config = shellbridge::init()?;
//! let manager = ShellSessionManager::with_pty(config);
//! manager.create_shell_session().await?;
//!
//! let output = manager
//!     .execute_shell_command("ls -la", ExecuteOptions::default())
//!     .await?;
//! println!("{}", output);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **PTY Reader/Writer Threads:** Blocking PTY I/O, bridged with `tokio::mpsc`
//! - **Pump Task:** Feeds each output chunk to the emulator, the detector and subscribers
//! - **Callers:** Serialized by the session lock; background dispatches bypass it

#[macro_use]
extern crate tracing;

pub mod ansi;
pub mod config;
pub mod error;
pub mod models;
pub mod protocol;
pub mod pty;
pub mod terminal;

pub use config::loader::ConfigLoader;
pub use config::Config;
pub use error::{Error, Result};
pub use models::{SessionState, ShellType};
pub use protocol::{ExecuteOptions, Sentinel, ShellSessionManager};
pub use pty::{PtySpawner, SessionEvent};
pub use terminal::{ScrollbackBuffer, TerminalEmulator};

/// The current version of shellbridge from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The library name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Load configuration from the default locations
///
/// Falls back to defaults when no file is found or it cannot be loaded; an
/// invalid configuration is an error.
pub fn init() -> Result<Config> {
    info!("Initializing {} v{}", NAME, VERSION);

    let config = match ConfigLoader::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load configuration: {}. Using defaults", e);
            Config::default()
        }
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from `config_path`
///
/// # Errors
///
/// Returns an error if the file is missing, unparsable or invalid.
pub fn init_with_config(config_path: &std::path::Path) -> Result<Config> {
    info!(
        "Initializing {} v{} with config: {}",
        NAME,
        VERSION,
        config_path.display()
    );

    if !config_path.exists() {
        return Err(Error::ConfigLoadFailed {
            path: config_path.to_path_buf(),
            reason: "Configuration file does not exist".to_string(),
        });
    }

    let config = ConfigLoader::load_from_path(config_path)?;
    config.validate()?;
    Ok(config)
}

/// Human-readable explanation of a startup failure
pub fn handle_startup_error(error: &Error) -> String {
    match error {
        Error::ConfigLoadFailed { path, reason } => {
            format!(
                "Configuration Error: Failed to load config from '{}': {}\n\nTry:\n• Check configuration file syntax\n• Ensure file permissions are correct",
                path.display(),
                reason
            )
        }
        Error::ConfigParseFailed { format, reason } => {
            format!(
                "Configuration Error: Failed to parse {} config: {}",
                format, reason
            )
        }
        Error::ConfigValidationFailed { field, reason } => {
            format!(
                "Configuration Error: Validation failed for '{}': {}",
                field, reason
            )
        }
        Error::PtyCreationFailed { command, reason } => {
            format!(
                "Shell Error: Could not start '{}': {}\n\nTry:\n• Pass --shell with the full path of an installed shell",
                command, reason
            )
        }
        _ => {
            format!(
                "Unexpected Error: {}\n\nPlease report this issue with debug logs enabled",
                error
            )
        }
    }
}
