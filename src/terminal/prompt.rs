//! Prompt Detection Logic
//!
//! Best-effort prompt recognition for shells that have no sentinel recipe.
//! Lines are matched with trailing whitespace removed, since the scrollback
//! trims rendered lines.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::models::ShellType;

/// Built-in prompt patterns, most specific first
static DEFAULT_PATTERNS: Lazy<Vec<PromptPattern>> = Lazy::new(|| {
    [
        // Versioned shell prompts
        (ShellType::Bash, r"^bash-\d+\.\d+\$$"),
        (ShellType::Zsh, r"^zsh-\d+\.\d+%$"),
        (ShellType::Fish, r"^fish-\d+\.\d+>$"),
        // PowerShell must come before the generic `>` patterns
        (ShellType::PowerShell, r"^PS .*>$"),
        (ShellType::Unknown, r"^[A-Z]:\\.*>$"),
        // Basic prompts
        (ShellType::Bash, r"^\$$"),
        (ShellType::Zsh, r"^%$"),
        (ShellType::Fish, r"^>$"),
        (ShellType::Unknown, r"^#$"),
        // User@host and bracketed prompts
        (ShellType::Bash, r"^\[.*\][$#]$"),
        (ShellType::Zsh, r"^\[.*\]%$"),
        (ShellType::Fish, r"^\[.*\]>$"),
        (ShellType::Unknown, r"^[\w.-]+@[\w.-]+(:\S*)?\s?[$%#>]$"),
        // Path prompts
        (ShellType::Unknown, r"^[~/][\w/.-]*\s?[$%#]$"),
    ]
    .into_iter()
    .filter_map(|(shell_type, pattern)| match Regex::new(pattern) {
        Ok(regex) => Some(PromptPattern {
            shell_type,
            pattern: regex,
        }),
        Err(e) => {
            warn!("Failed to compile regex pattern '{}': {}", pattern, e);
            None
        }
    })
    .collect()
});

#[derive(Debug, Clone)]
pub struct PromptPattern {
    /// Shell the pattern is typical of
    shell_type: ShellType,
    /// Regex pattern for prompt detection
    pattern: Regex,
}

/// Prompt detector for degraded sessions
#[derive(Debug, Clone, Default)]
pub struct PromptDetector {
    /// Custom prompt patterns, checked before the built-in ones
    custom_patterns: Vec<Regex>,
}

impl PromptDetector {
    /// Create a new prompt detector
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect if a line looks like a shell prompt
    pub fn is_prompt(&self, line: &str) -> bool {
        let text = line.trim_end();
        if text.is_empty() {
            return false;
        }

        self.custom_patterns.iter().any(|p| p.is_match(text))
            || DEFAULT_PATTERNS.iter().any(|p| p.pattern.is_match(text))
    }

    /// Guess the shell flavor from prompt lines
    pub fn detect_shell_type(&self, lines: &[String]) -> ShellType {
        lines
            .iter()
            .rev()
            .map(|line| line.trim_end())
            .find_map(|text| {
                DEFAULT_PATTERNS
                    .iter()
                    .find(|p| p.pattern.is_match(text))
                    .map(|p| p.shell_type)
            })
            .unwrap_or(ShellType::Unknown)
    }

    /// Add custom prompt pattern
    pub fn add_custom_pattern(&mut self, pattern: &str) -> Result<()> {
        let regex = Regex::new(pattern)?;
        self.custom_patterns.push(regex);
        Ok(())
    }

}
