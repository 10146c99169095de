//! Command Execution Model
//!
//! One dispatched command (or interrupt) and the output gathered for it
//! while the completion detector waits for the shell to become idle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::ansi::OutputSanitizer;

/// Raw bytes kept per execution; older bytes are dropped from the front
pub const MAX_RAW_LEN: usize = 64 * 1024;

/// What was written to the shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionKind {
    /// A command line terminated by the profile's line terminator
    Command(String),
    /// The interrupt control byte
    Interrupt(u8),
}

impl ExecutionKind {
    /// What the shell echoes back for this execution
    ///
    /// The last non-empty line of the command, trimmed; multi-line commands
    /// are echoed line by line and the last one is the one that runs.
    pub fn echo_marker(&self) -> Option<&str> {
        match self {
            ExecutionKind::Command(command) => command
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty()),
            ExecutionKind::Interrupt(_) => None,
        }
    }

    /// Text used in logs and error messages
    pub fn display_text(&self) -> String {
        match self {
            ExecutionKind::Command(command) => command.clone(),
            ExecutionKind::Interrupt(byte) => format!("^{}", byte.wrapping_add(b'@') as char),
        }
    }
}

/// Position in the execution state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionState {
    /// Nothing dispatched
    #[default]
    Idle,
    /// Interrupt-and-drain before a dispatch
    Interrupting,
    /// Written to the channel, no output yet
    Dispatched,
    /// Output arriving, waiting for the completion signal
    DetectingCompletion,
    /// Completion seen, waiting for the scrollback to settle
    QuiescenceWait,
    /// Output extracted
    Done,
    /// The caller stopped waiting
    TimedOut,
    /// The channel closed or the execution was replaced
    Aborted,
}

impl ExecutionState {
    /// Whether no further transitions happen from this state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Idle
                | ExecutionState::Done
                | ExecutionState::TimedOut
                | ExecutionState::Aborted
        )
    }
}

/// What marks the shell as idle again
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionSignal {
    /// The installed sentinel string
    Sentinel(String),
    /// Best-effort prompt pattern matching for degraded sessions
    PromptHeuristic,
}

/// Sanitized, append-only view of an execution's output
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    text: String,
    /// Length of the prefix the last append left untouched
    settled: usize,
    frozen: bool,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize raw bytes onto the buffer; ignored once frozen
    pub fn append_raw(&mut self, raw: &[u8], sanitizer: &mut OutputSanitizer) {
        if !self.frozen {
            self.settled = sanitizer.sanitize_into(raw, &mut self.text);
        }
    }

    /// Bytes before this offset were not rewritten by the last append
    ///
    /// Backspaces and wrap artifacts may erase the tail of what was there.
    pub fn settled_len(&self) -> usize {
        self.settled
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// The single in-flight execution of a session
#[derive(Debug)]
pub struct CommandExecution {
    /// Command text or interrupt byte
    pub kind: ExecutionKind,

    /// Tail of the unsanitized output, at most `MAX_RAW_LEN` bytes
    raw: Vec<u8>,

    /// Sanitized output since dispatch
    output: OutputBuffer,

    /// Current state
    state: ExecutionState,

    /// What the completion test looks for
    pub signal: CompletionSignal,

    /// When the execution was dispatched
    pub started_at: DateTime<Utc>,

    /// Fired once when the completion signal is seen
    notify: Option<oneshot::Sender<()>>,
}

impl CommandExecution {
    /// Create an execution and the receiver its waiter listens on
    pub fn new(kind: ExecutionKind, signal: CompletionSignal) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let execution = Self {
            kind,
            raw: Vec::new(),
            output: OutputBuffer::new(),
            state: ExecutionState::Dispatched,
            signal,
            started_at: Utc::now(),
            notify: Some(tx),
        };
        (execution, rx)
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn set_state(&mut self, state: ExecutionState) {
        self.state = state;
    }

    /// Whether the completion signal has been observed
    pub fn is_complete(&self) -> bool {
        matches!(
            self.state,
            ExecutionState::QuiescenceWait | ExecutionState::Done
        )
    }

    /// Record a chunk in sanitized form
    pub fn record(&mut self, raw: &[u8], sanitizer: &mut OutputSanitizer) {
        if self.output.is_frozen() {
            return;
        }
        self.append_raw_tail(raw);
        self.output.append_raw(raw, sanitizer);
        if self.state == ExecutionState::Dispatched {
            self.state = ExecutionState::DetectingCompletion;
        }
    }

    fn append_raw_tail(&mut self, bytes: &[u8]) {
        if bytes.len() >= MAX_RAW_LEN {
            self.raw.clear();
            self.raw.extend_from_slice(&bytes[bytes.len() - MAX_RAW_LEN..]);
            return;
        }
        let overflow = (self.raw.len() + bytes.len()).saturating_sub(MAX_RAW_LEN);
        self.raw.drain(..overflow);
        self.raw.extend_from_slice(bytes);
    }

    /// Most recent unsanitized output, escapes included
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    /// Freeze the output and wake the waiter
    pub fn complete(&mut self) {
        self.output.freeze();
        self.state = ExecutionState::QuiescenceWait;
        if let Some(tx) = self.notify.take() {
            let _ = tx.send(());
        }
    }

    /// Mark aborted; dropping the sender wakes the waiter with an error
    pub fn abort(&mut self) {
        self.output.freeze();
        self.state = ExecutionState::Aborted;
        self.notify.take();
    }

    /// Milliseconds since dispatch
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}
