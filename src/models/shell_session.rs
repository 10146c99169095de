//! Shell Session Model
//!
//! Protocol-level state of one interactive shell: its flavor, the installed
//! sentinel, lifecycle state and the cached working directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::ShellType;
use crate::error::{Error, Result};
use crate::protocol::sentinel::Sentinel;

/// Lifecycle state of a shell session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SessionState {
    /// No shell has been spawned yet
    #[default]
    Uninitialized,
    /// Shell spawned, sentinel being installed
    Installing,
    /// Session is ready for commands
    Ready,
    /// Session has been closed
    Closed,
}

/// One interactive shell as seen by the protocol
#[derive(Debug, Clone)]
pub struct ShellSession {
    /// Session identifier
    pub id: String,

    /// Shell flavor detected from the program name
    pub shell_type: ShellType,

    /// Program that was spawned
    pub program: Option<String>,

    /// Marker emitted after every prompt; fixed once installed
    sentinel: Option<Sentinel>,

    /// Lifecycle state
    state: SessionState,

    /// Set when no sentinel could be installed
    degraded: bool,

    /// Last known-good working directory
    cwd: Option<PathBuf>,

    /// Set when the cached directory may be stale
    cwd_dirty: bool,

    /// When the session was created
    pub created_at: DateTime<Utc>,
}

impl ShellSession {
    /// Create an uninitialized session
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            shell_type: ShellType::Unknown,
            program: None,
            sentinel: None,
            state: SessionState::Uninitialized,
            degraded: false,
            cwd: None,
            cwd_dirty: true,
            created_at: Utc::now(),
        }
    }

    /// Record the spawned program and derive the flavor from it
    ///
    /// A sentinel chosen for a different flavor is dropped.
    pub fn attach_program(&mut self, program: &str) {
        let shell_type = ShellType::from_program(program);
        if shell_type != self.shell_type {
            self.sentinel = None;
        }
        self.program = Some(program.to_string());
        self.shell_type = shell_type;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Session {} state {:?} -> {:?}", self.id, self.state, state);
            self.state = state;
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, SessionState::Ready)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed)
    }

    pub fn sentinel(&self) -> Option<&Sentinel> {
        self.sentinel.as_ref()
    }

    /// Choose the sentinel; rejected once the session is ready
    pub fn set_sentinel(&mut self, sentinel: Sentinel) -> Result<()> {
        if self.is_ready() && self.sentinel.is_some() {
            return Err(Error::SentinelAlreadyInstalled);
        }
        self.sentinel = Some(sentinel);
        Ok(())
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn mark_degraded(&mut self) {
        self.degraded = true;
    }

    /// Cached working directory, regardless of staleness
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn is_cwd_dirty(&self) -> bool {
        self.cwd_dirty
    }

    pub fn mark_cwd_dirty(&mut self) {
        self.cwd_dirty = true;
    }

    /// Store a freshly resolved directory and clear the dirty flag
    pub fn set_cwd(&mut self, cwd: PathBuf) {
        self.cwd = Some(cwd);
        self.cwd_dirty = false;
    }

    /// Reset protocol state for a freshly spawned shell
    ///
    /// The sentinel survives so a respawn reinstalls the same marker.
    pub fn reset_for_respawn(&mut self) {
        self.state = SessionState::Uninitialized;
        self.degraded = false;
        self.cwd_dirty = true;
    }
}

impl Default for ShellSession {
    fn default() -> Self {
        Self::new()
    }
}
