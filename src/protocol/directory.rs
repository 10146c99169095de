//! Working Directory Tracking
//!
//! The shell's working directory is cached on the session and only queried
//! again after a command that may have changed it. Queries go through a
//! `CommandRunner` so the recovery ladder can be tested without a shell.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::detector::CompletionDetector;
use super::sentinel::{SentinelInstaller, ShellProfile};
use crate::error::{Error, Result};
use crate::models::{SessionState, ShellSession};
use crate::pty::channel::ByteChannel;
use crate::pty::events::SessionEventBus;
use crate::terminal::TerminalEmulator;

/// Commands that may move the shell to another directory
static CD_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:builtin\s+|command\s+)?(cd|pushd|popd|chdir|Set-Location|sl|Push-Location|Pop-Location)(\s|$)",
    )
    .map_err(|e| error!("Invalid directory pattern: {}", e))
    .ok()
});

/// What the tracker needs from the rest of the protocol
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` in the foreground and return its captured output
    async fn run_captured(
        &self,
        session: &mut ShellSession,
        command: &str,
        timeout: Duration,
    ) -> Result<String>;

    /// Interrupt whatever the shell is doing
    async fn interrupt(&self, session: &mut ShellSession) -> Result<()>;

    /// Write the sentinel install sequence again
    async fn reinstall_sentinel(&self, session: &mut ShellSession) -> Result<()>;

    /// Tell the user something went wrong
    fn notify(&self, message: &str);
}

/// Cached working directory with a staged recovery path
#[derive(Debug, Clone)]
pub struct DirectoryTracker {
    timeout: Duration,
}

impl DirectoryTracker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Mark the cache dirty if `command` may change directory
    ///
    /// Returns whether it did.
    pub fn observe(&self, session: &mut ShellSession, command: &str) -> bool {
        if changes_directory(command) {
            debug!("'{}' may change directory", command);
            session.mark_cwd_dirty();
            true
        } else {
            false
        }
    }

    /// The shell's working directory
    ///
    /// Served from the cache unless a directory change was observed. A
    /// failed query is retried after an interrupt and again after
    /// reinstalling the sentinel; if all three fail the last known-good
    /// directory is returned.
    pub async fn current_directory(
        &self,
        session: &mut ShellSession,
        runner: &dyn CommandRunner,
    ) -> Result<PathBuf> {
        if !session.is_cwd_dirty() {
            if let Some(cwd) = session.cwd() {
                return Ok(cwd.to_path_buf());
            }
        }

        let mut last_error = match self.query(session, runner).await {
            Ok(cwd) => return Ok(cwd),
            Err(e) => e,
        };

        warn!("Directory query failed ({}), interrupting and retrying", last_error);
        match runner.interrupt(session).await {
            Ok(()) => match self.query(session, runner).await {
                Ok(cwd) => return Ok(cwd),
                Err(e) => last_error = e,
            },
            Err(e) => debug!("Interrupt before retry failed: {}", e),
        }

        warn!("Directory query failed ({}), reinstalling sentinel", last_error);
        match runner.reinstall_sentinel(session).await {
            Ok(()) => match self.query(session, runner).await {
                Ok(cwd) => return Ok(cwd),
                Err(e) => last_error = e,
            },
            Err(e) => last_error = e,
        }

        error!("Could not determine working directory: {}", last_error);
        match session.cwd() {
            Some(cwd) => {
                runner.notify(&format!(
                    "Could not determine the working directory; using last known {}",
                    cwd.display()
                ));
                Ok(cwd.to_path_buf())
            }
            None => {
                runner.notify("Could not determine the working directory");
                Err(Error::DirectoryUnavailable {
                    reason: last_error.to_string(),
                })
            }
        }
    }

    async fn query(&self, session: &mut ShellSession, runner: &dyn CommandRunner) -> Result<PathBuf> {
        let profile = ShellProfile::for_shell(session.shell_type);
        let output = runner
            .run_captured(session, profile.pwd_command, self.timeout)
            .await?;

        let cwd = parse_directory(&output).ok_or_else(|| Error::DirectoryUnavailable {
            reason: format!("no directory in {:?}", output),
        })?;
        debug!("Working directory is {}", cwd.display());
        session.set_cwd(cwd.clone());
        Ok(cwd)
    }
}

/// Whether any segment of `command` is a directory-changing builtin
pub fn changes_directory(command: &str) -> bool {
    let Some(pattern) = CD_PATTERN.as_ref() else {
        return false;
    };
    // `&&`, `||`, `|`, `;` and newlines all start a new command
    command
        .split(['&', '|', ';', '\n'])
        .any(|segment| pattern.is_match(segment))
}

/// Last line of `output` that names an existing absolute directory
pub fn parse_directory(output: &str) -> Option<PathBuf> {
    output
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Path::new)
        .find(|path| path.is_absolute() && path.is_dir())
        .map(Path::to_path_buf)
}

/// `CommandRunner` backed by the live detector and channel
pub struct ProtocolRunner<'a> {
    pub detector: &'a CompletionDetector,
    pub channel: Arc<dyn ByteChannel>,
    pub emulator: &'a dyn TerminalEmulator,
    pub events: &'a SessionEventBus,
    pub settle_delay: Duration,
}

#[async_trait]
impl CommandRunner for ProtocolRunner<'_> {
    async fn run_captured(
        &self,
        session: &mut ShellSession,
        command: &str,
        timeout: Duration,
    ) -> Result<String> {
        self.detector
            .execute(self.channel.as_ref(), session, command, Some(timeout))
            .await
    }

    async fn interrupt(&self, session: &mut ShellSession) -> Result<()> {
        self.detector.interrupt(self.channel.as_ref(), session).await
    }

    async fn reinstall_sentinel(&self, session: &mut ShellSession) -> Result<()> {
        SentinelInstaller::new(
            self.channel.as_ref(),
            self.emulator,
            self.events,
            self.settle_delay,
        )
        .install(session)
        .await?;
        session.set_state(SessionState::Ready);
        Ok(())
    }

    fn notify(&self, message: &str) {
        self.events.notice(message);
    }
}
