//! Terminal Emulation Boundary
//!
//! The protocol never renders anything itself. It feeds raw bytes to a
//! terminal emulator, polls the emulator's scrollback for quiescence and
//! reads rendered lines back when extracting a command's output.

pub mod prompt;
pub mod scrollback;

pub use prompt::PromptDetector;
pub use scrollback::{ScrollbackBuffer, DEFAULT_COLUMNS};

use std::ops::Range;

/// Opaque token identifying one rendered state of the scrollback
///
/// Two snapshots compare equal only if nothing was rendered in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScrollbackSnapshot(u64);

impl ScrollbackSnapshot {
    pub fn new(generation: u64) -> Self {
        Self(generation)
    }
}

/// Terminal emulator the session renders into
pub trait TerminalEmulator: Send + Sync {
    /// Render raw output bytes, escapes included
    fn feed(&self, data: &[u8]);

    /// Current scrollback identity, for equality polling only
    fn snapshot(&self) -> ScrollbackSnapshot;

    /// Number of lines in the scrollback
    fn line_count(&self) -> usize;

    /// Plain text of the lines in `range`, clamped to what exists
    fn lines(&self, range: Range<usize>) -> Vec<String>;

    /// Discard all scrollback
    fn clear(&self);

    /// The terminal was resized; rows already rendered keep their wrapping
    fn resize(&self, _cols: u16, _rows: u16) {}

    /// The last `count` lines
    fn tail(&self, count: usize) -> Vec<String> {
        let total = self.line_count();
        self.lines(total.saturating_sub(count)..total)
    }
}
