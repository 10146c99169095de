//! Completion Detection
//!
//! The execution state machine. A foreground command is preceded by an
//! interrupt-and-drain, written to the channel, and considered finished once
//! the completion signal shows up after the command's echo. The scrollback
//! is then given time to settle before the output is read back.
//!
//! Chunks arrive from the pump through [`CompletionDetector::feed`]; the
//! waiting caller is woken through a oneshot channel. The internal mutex is
//! never held across an await point.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

use super::output::{extract_output, truncate_output, BACKGROUND_STARTED};
use super::sentinel::ShellProfile;
use crate::ansi::OutputSanitizer;
use crate::config::{OutputConfig, ProtocolConfig};
use crate::error::{Error, Result};
use crate::models::{
    CommandExecution, CompletionSignal, ExecutionKind, ExecutionState, ShellSession, ShellType,
};
use crate::pty::channel::ByteChannel;
use crate::terminal::{PromptDetector, TerminalEmulator};

struct DetectorState {
    /// Sanitizer state spans every chunk the shell produced
    sanitizer: OutputSanitizer,
    /// The one execution in flight, or the last one to finish
    current: Option<CommandExecution>,
    /// How far the completion test has read into `current`'s output
    scan: CompletionScan,
    /// Set once the session is closed; nothing new is accepted
    closed: bool,
}

/// Drives executions and decides when they are finished
pub struct CompletionDetector {
    state: Mutex<DetectorState>,
    emulator: Arc<dyn TerminalEmulator>,
    protocol: ProtocolConfig,
    output: OutputConfig,
    prompt: PromptDetector,
}

impl CompletionDetector {
    pub fn new(
        emulator: Arc<dyn TerminalEmulator>,
        protocol: ProtocolConfig,
        output: OutputConfig,
    ) -> Self {
        let mut prompt = PromptDetector::new();
        for pattern in &protocol.prompt_patterns {
            if let Err(e) = prompt.add_custom_pattern(pattern) {
                warn!("Ignoring prompt pattern '{}': {}", pattern, e);
            }
        }

        Self {
            state: Mutex::new(DetectorState {
                sanitizer: OutputSanitizer::new(),
                current: None,
                scan: CompletionScan::default(),
                closed: false,
            }),
            emulator,
            protocol,
            output,
            prompt,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DetectorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Completion signal for a session's current setup
    pub fn signal_for(session: &ShellSession) -> CompletionSignal {
        match session.sentinel() {
            Some(sentinel) if !session.is_degraded() => {
                CompletionSignal::Sentinel(sentinel.as_str().to_string())
            }
            _ => CompletionSignal::PromptHeuristic,
        }
    }

    /// Process one raw output chunk
    pub fn feed(&self, chunk: &[u8]) {
        let mut guard = self.lock();
        let DetectorState {
            sanitizer,
            current,
            scan,
            ..
        } = &mut *guard;

        let execution = match current {
            Some(execution) if is_collecting(execution.state()) => execution,
            _ => {
                // Keep the parser in step even when nobody is listening
                sanitizer.sanitize(chunk);
                return;
            }
        };

        execution.record(chunk, sanitizer);
        if scan.signal_seen(execution, &self.prompt) {
            debug!(
                "Completion signal seen for '{}' after {}ms",
                execution.kind.display_text(),
                execution.elapsed_ms()
            );
            execution.complete();
        }
    }

    /// Whether an execution is in a non-terminal state
    pub fn is_busy(&self) -> bool {
        self.lock()
            .current
            .as_ref()
            .is_some_and(|e| !e.state().is_terminal())
    }

    /// State of the current (or last) execution
    pub fn execution_state(&self) -> ExecutionState {
        self.lock()
            .current
            .as_ref()
            .map(CommandExecution::state)
            .unwrap_or_default()
    }

    /// Abort whatever is in flight; its waiter gets `ExecutionAborted`
    pub fn abort_pending(&self) {
        if let Some(execution) = self.lock().current.as_mut() {
            if !execution.state().is_terminal() {
                debug!("Aborting '{}'", execution.kind.display_text());
                execution.abort();
            }
        }
    }

    /// Refuse further executions and abort the pending one
    pub fn shutdown(&self) {
        self.lock().closed = true;
        self.abort_pending();
    }

    /// Start over for a freshly spawned shell
    pub fn reset(&self) {
        let mut state = self.lock();
        state.sanitizer = OutputSanitizer::new();
        state.current = None;
        state.scan = CompletionScan::default();
        state.closed = false;
    }

    fn set_state(&self, state: ExecutionState) {
        if let Some(execution) = self.lock().current.as_mut() {
            execution.set_state(state);
        }
    }

    /// Replace the current execution, aborting it if still pending
    fn register(
        &self,
        kind: ExecutionKind,
        signal: CompletionSignal,
        initial: ExecutionState,
    ) -> Result<oneshot::Receiver<()>> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::SessionClosed);
        }

        if let Some(previous) = state.current.as_mut() {
            if !previous.state().is_terminal() {
                warn!(
                    "Replacing unfinished execution '{}'",
                    previous.kind.display_text()
                );
                previous.abort();
            }
        }

        let (mut execution, rx) = CommandExecution::new(kind, signal);
        execution.set_state(initial);
        state.current = Some(execution);
        state.scan = CompletionScan::default();
        Ok(rx)
    }

    /// Write `command` and return at once without tracking it
    pub fn dispatch_background(
        &self,
        channel: &dyn ByteChannel,
        shell_type: ShellType,
        command: &str,
    ) -> Result<String> {
        if command.trim().is_empty() {
            return Err(Error::EmptyCommand);
        }
        let profile = ShellProfile::for_shell(shell_type);
        channel.write(profile.terminate(command).as_bytes())?;
        info!("Dispatched background command '{}'", command);
        Ok(BACKGROUND_STARTED.to_string())
    }

    /// Run a foreground command and return its captured output
    ///
    /// `timeout` bounds only the wait for the completion signal. When it
    /// expires the command keeps running in the shell.
    pub async fn execute(
        &self,
        channel: &dyn ByteChannel,
        session: &ShellSession,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String> {
        if command.trim().is_empty() {
            return Err(Error::EmptyCommand);
        }

        let profile = ShellProfile::for_shell(session.shell_type);
        let signal = Self::signal_for(session);

        self.drain(channel, session).await?;

        let kind = ExecutionKind::Command(command.to_string());
        let marker = kind.echo_marker().map(str::to_string);
        let rx = self.register(kind, signal.clone(), ExecutionState::Dispatched)?;
        if let Err(e) = channel.write(profile.terminate(command).as_bytes()) {
            self.abort_pending();
            return Err(e);
        }
        debug!("Dispatched '{}'", command);

        let waited = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(result) => result,
                Err(_) => {
                    self.set_state(ExecutionState::TimedOut);
                    warn!("Gave up waiting for '{}' after {:?}", command, limit);
                    return Err(Error::CommandTimeout {
                        command: command.to_string(),
                        duration: limit,
                    });
                }
            },
            None => rx.await,
        };
        waited.map_err(|_| Error::ExecutionAborted {
            command: command.to_string(),
        })?;

        self.wait_for_quiescence().await;

        let lines = self.emulator.tail(self.protocol.extraction_lines);
        let captured = extract_output(&lines, marker.as_deref(), &signal, &self.prompt);
        let captured = truncate_output(&captured, &self.output);

        self.set_state(ExecutionState::Done);
        Ok(captured)
    }

    /// Interrupt the foreground job and wait for the shell to be idle
    ///
    /// Bounded by the drain timeout; expiry leaves the shell as it is.
    pub async fn interrupt(&self, channel: &dyn ByteChannel, session: &ShellSession) -> Result<()> {
        let limit = self.protocol.drain_timeout();
        match tokio::time::timeout(limit, self.run_interrupt(channel, session)).await {
            Ok(result) => result,
            Err(_) => {
                self.set_state(ExecutionState::TimedOut);
                Err(Error::CommandTimeout {
                    command: "^C".to_string(),
                    duration: limit,
                })
            }
        }
    }

    /// Interrupt-and-drain ahead of a dispatch
    ///
    /// A shell that does not come back in time is not fatal; the command is
    /// dispatched anyway.
    async fn drain(&self, channel: &dyn ByteChannel, session: &ShellSession) -> Result<()> {
        match self.interrupt(channel, session).await {
            Ok(()) => Ok(()),
            Err(Error::SessionClosed) => Err(Error::SessionClosed),
            Err(e) if e.is_recoverable() => {
                warn!("Drain before dispatch incomplete: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn run_interrupt(&self, channel: &dyn ByteChannel, session: &ShellSession) -> Result<()> {
        let profile = ShellProfile::for_shell(session.shell_type);
        let kind = ExecutionKind::Interrupt(profile.interrupt_byte);
        let display = kind.display_text();
        let rx = self.register(kind, Self::signal_for(session), ExecutionState::Interrupting)?;

        if let Err(e) = channel.write(&[profile.interrupt_byte]) {
            self.abort_pending();
            return Err(e);
        }

        rx.await
            .map_err(|_| Error::ExecutionAborted { command: display })?;
        self.wait_for_quiescence().await;
        self.set_state(ExecutionState::Done);
        Ok(())
    }

    /// Poll the scrollback until two consecutive snapshots agree
    async fn wait_for_quiescence(&self) {
        let poll = self.protocol.quiescence_poll();
        let mut previous = self.emulator.snapshot();

        for _ in 0..self.protocol.quiescence_max_polls {
            tokio::time::sleep(poll).await;
            let current = self.emulator.snapshot();
            if current == previous {
                return;
            }
            previous = current;
        }

        warn!(
            "Scrollback still changing after {} polls, extracting anyway",
            self.protocol.quiescence_max_polls
        );
    }
}

/// States in which output counts towards the completion test
fn is_collecting(state: ExecutionState) -> bool {
    matches!(
        state,
        ExecutionState::Interrupting | ExecutionState::Dispatched | ExecutionState::DetectingCompletion
    )
}

/// Prompts are short; longer lines are never tested against the patterns
const MAX_PROMPT_LEN: usize = 1024;

/// The completion test, run incrementally over the sanitized output
///
/// A command is complete once the signal follows the last occurrence of its
/// echo marker; an interrupt's echo is not the literal control byte, so any
/// signal after dispatch counts. If the echo never shows up (a line editor
/// mangled it) any signal counts as well.
///
/// Each call only reads what was appended since the previous one, plus
/// enough overlap to catch a marker or sentinel split across chunks.
#[derive(Debug, Default)]
struct CompletionScan {
    /// Bytes of output already searched
    scanned: usize,
    /// End of the newest echo marker
    echo_end: Option<usize>,
    /// Offset of the newest line break
    last_newline: Option<usize>,
}

impl CompletionScan {
    fn signal_seen(&mut self, execution: &CommandExecution, prompt: &PromptDetector) -> bool {
        let output = execution.output();
        if output.settled_len() < self.scanned {
            // Erased text may have held the marker; search everything again
            *self = Self::default();
        }

        let text = output.as_str();
        let marker = execution.kind.echo_marker();
        let signal_len = match &execution.signal {
            CompletionSignal::Sentinel(sentinel) => sentinel.len(),
            CompletionSignal::PromptHeuristic => 1,
        };
        let overlap = marker.map_or(0, str::len).max(signal_len).saturating_sub(1);
        let from = floor_char_boundary(text, self.scanned.saturating_sub(overlap));
        let fresh = &text[from..];

        if let Some(marker) = marker {
            // The overlap may hold an echo seen before; never move backwards
            if let Some(end) = fresh.rfind(marker).map(|pos| from + pos + marker.len()) {
                if self.echo_end.map_or(true, |seen| end > seen) {
                    self.echo_end = Some(end);
                }
            }
        }
        if let Some(pos) = fresh.rfind('\n') {
            self.last_newline = Some(from + pos);
        }
        self.scanned = text.len();

        let region_start = self.echo_end.unwrap_or(0);
        match &execution.signal {
            CompletionSignal::Sentinel(sentinel) => {
                text[from.max(region_start)..].contains(sentinel.as_str())
            }
            CompletionSignal::PromptHeuristic => match self.last_newline {
                Some(newline) if newline >= region_start => {
                    let line = &text[newline + 1..];
                    line.len() <= MAX_PROMPT_LEN && prompt.is_prompt(line)
                }
                _ => false,
            },
        }
    }
}

/// Largest char boundary at or before `index`
fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
