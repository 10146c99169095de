//! Configuration management for shellbridge
//!
//! Shell spawning, protocol timing and output budgets. Every section has
//! sensible defaults so a partial file (or none at all) still yields a
//! usable configuration.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How the shell process is spawned
    pub shell: ShellConfig,

    /// Completion detection and directory tracking timing
    pub protocol: ProtocolConfig,

    /// Captured output budget
    pub output: OutputConfig,
}

/// Shell process configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell executable; `$SHELL` (or the platform default) when unset
    pub program: Option<PathBuf>,

    /// Shell arguments
    pub args: Vec<String>,

    /// Extra environment variables
    pub environment: HashMap<String, String>,

    /// Whether to inherit the parent environment
    pub inherit_env: bool,

    /// Working directory for the shell
    pub working_directory: Option<PathBuf>,

    /// Initial terminal dimensions (cols, rows)
    pub dimensions: (u16, u16),
}

impl Default for ShellConfig {
    fn default() -> Self {
        let mut environment = HashMap::new();
        environment.insert("TERM".to_string(), "xterm-256color".to_string());

        Self {
            program: None,
            args: Vec::new(),
            environment,
            inherit_env: true,
            working_directory: None,
            dimensions: (120, 30),
        }
    }
}

/// Protocol timing configuration (all values in milliseconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Interval between scrollback polls while waiting for quiescence
    pub quiescence_poll_ms: u64,

    /// Upper bound on quiescence polls before extraction proceeds anyway
    pub quiescence_max_polls: u32,

    /// Bound on the interrupt-and-drain that precedes every dispatch
    pub drain_timeout_ms: u64,

    /// Bound on each `pwd` query issued by the directory tracker
    pub directory_timeout_ms: u64,

    /// Delay after installing the sentinel before the scrollback is cleared
    pub settle_delay_ms: u64,

    /// Resize requests inside this window collapse into one
    pub resize_debounce_ms: u64,

    /// Number of trailing scrollback lines scanned during extraction
    pub extraction_lines: usize,

    /// Maximum lines retained by the built-in scrollback
    pub scrollback_limit: usize,

    /// Extra prompt regexes for sessions without a sentinel
    pub prompt_patterns: Vec<String>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            quiescence_poll_ms: 300,
            quiescence_max_polls: 40,
            drain_timeout_ms: 5000,
            directory_timeout_ms: 500,
            settle_delay_ms: 500,
            resize_debounce_ms: 100,
            extraction_lines: 200,
            scrollback_limit: 10_000,
            prompt_patterns: Vec::new(),
        }
    }
}

impl ProtocolConfig {
    pub fn quiescence_poll(&self) -> Duration {
        Duration::from_millis(self.quiescence_poll_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn directory_timeout(&self) -> Duration {
        Duration::from_millis(self.directory_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }
}

/// Budget applied to captured command output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Maximum number of lines returned before truncation kicks in
    pub max_lines: usize,

    /// Maximum number of characters returned before truncation kicks in
    pub max_chars: usize,

    /// Lines kept from the start of truncated output
    pub head_lines: usize,

    /// Lines kept from the end of truncated output
    pub tail_lines: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_lines: 100,
            max_chars: 5000,
            head_lines: 40,
            tail_lines: 40,
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(program) = &self.shell.program {
            if program.as_os_str().is_empty() {
                return Err(invalid("shell.program", "Shell program cannot be empty"));
            }
        }

        let (cols, rows) = self.shell.dimensions;
        if cols == 0 || rows == 0 {
            return Err(invalid(
                "shell.dimensions",
                "Terminal dimensions must be greater than 0",
            ));
        }

        let protocol = &self.protocol;
        if protocol.quiescence_poll_ms == 0 {
            return Err(invalid(
                "protocol.quiescence_poll_ms",
                "Quiescence poll interval must be greater than 0",
            ));
        }
        if protocol.quiescence_max_polls < 2 {
            return Err(invalid(
                "protocol.quiescence_max_polls",
                "At least two polls are needed to observe a stable scrollback",
            ));
        }
        if protocol.drain_timeout_ms == 0 || protocol.directory_timeout_ms == 0 {
            return Err(invalid(
                "protocol",
                "Drain and directory timeouts must be greater than 0",
            ));
        }
        if protocol.extraction_lines == 0 {
            return Err(invalid(
                "protocol.extraction_lines",
                "Extraction window must be greater than 0",
            ));
        }
        if protocol.scrollback_limit < protocol.extraction_lines {
            return Err(invalid(
                "protocol.scrollback_limit",
                "Scrollback limit cannot be smaller than the extraction window",
            ));
        }

        for pattern in &protocol.prompt_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(invalid("protocol.prompt_patterns", &e.to_string()));
            }
        }

        let output = &self.output;
        if output.max_lines == 0 || output.max_chars == 0 {
            return Err(invalid(
                "output",
                "Output budgets must be greater than 0",
            ));
        }
        if output.head_lines + output.tail_lines >= output.max_lines {
            return Err(invalid(
                "output.head_lines",
                "Head and tail lines must leave room below max_lines",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> Error {
    Error::ConfigValidationFailed {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
