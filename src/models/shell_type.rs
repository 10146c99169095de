//! Shell Type Definitions
//!
//! Canonical definition of the shell flavors the protocol knows how to drive.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Flavor of the interactive shell behind a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ShellType {
    /// Bourne Again Shell
    Bash,
    /// Z Shell
    Zsh,
    /// Fish Shell
    Fish,
    /// PowerShell (Windows PowerShell or pwsh)
    PowerShell,
    /// Anything without a sentinel recipe
    #[default]
    Unknown,
}

impl ShellType {
    /// Get a string representation of the shell type
    pub fn as_str(&self) -> &'static str {
        match self {
            ShellType::Bash => "bash",
            ShellType::Zsh => "zsh",
            ShellType::Fish => "fish",
            ShellType::PowerShell => "powershell",
            ShellType::Unknown => "unknown",
        }
    }

    /// Get shell type from a shell name (case-insensitive)
    pub fn from_string(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "bash" => ShellType::Bash,
            "zsh" => ShellType::Zsh,
            "fish" => ShellType::Fish,
            "powershell" | "pwsh" => ShellType::PowerShell,
            _ => ShellType::Unknown,
        }
    }

    /// Detect the flavor from the spawned program's basename
    ///
    /// Handles login-shell names (`-bash`), Windows executables
    /// (`pwsh.exe`) and full paths.
    pub fn from_program(program: &str) -> Self {
        let basename = Path::new(program)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(program);

        // Windows paths are not split by `Path` on unix hosts
        let basename = basename.rsplit('\\').next().unwrap_or(basename);
        let basename = basename.trim_start_matches('-');
        let lower = basename.to_lowercase();
        let stem = lower.strip_suffix(".exe").unwrap_or(&lower);

        Self::from_string(stem)
    }

    /// Whether the shell follows POSIX-style prompt hooks
    pub fn is_posix(&self) -> bool {
        matches!(self, ShellType::Bash | ShellType::Zsh | ShellType::Fish)
    }

    /// Whether a sentinel recipe exists for this flavor
    pub fn supports_sentinel(&self) -> bool {
        !matches!(self, ShellType::Unknown)
    }
}

impl std::fmt::Display for ShellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
