//! ANSI escape code processing
//!
//! Turns raw shell output into plain text suitable for substring search.
//! The sanitizer is incremental: `vte` keeps its parser state between
//! chunks, so an escape sequence or a UTF-8 code point split across two
//! reads is still handled as a unit.

use vte::{Params, Parser, Perform};

const BACKSPACE: u8 = 0x08;

/// Incremental ANSI/control sequence stripper
pub struct OutputSanitizer {
    parser: Parser,
    /// A `\r` arrived and nothing has followed it yet
    pending_cr: bool,
}

impl OutputSanitizer {
    /// Create a new sanitizer
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            pending_cr: false,
        }
    }

    /// Sanitize one chunk into a fresh string
    pub fn sanitize(&mut self, bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len());
        self.sanitize_into(bytes, &mut out);
        out
    }

    /// Sanitize one chunk, appending to `out`
    ///
    /// Backspaces erase characters already present in `out` as long as they
    /// are on the current line, so the caller should pass the cumulative
    /// buffer when it has one. The same goes for the space readline prints
    /// before the `\r` that wraps a long command line.
    ///
    /// Returns the shortest length `out` had during the call; everything
    /// before it is unchanged.
    pub fn sanitize_into(&mut self, bytes: &[u8], out: &mut String) -> usize {
        let mut collector = PlainText {
            low_water: out.len(),
            out,
            pending_cr: &mut self.pending_cr,
        };
        self.parser.advance(&mut collector, bytes);
        collector.low_water
    }

    /// Drop any partially parsed sequence
    pub fn reset(&mut self) {
        self.parser = Parser::new();
        self.pending_cr = false;
    }
}

impl Default for OutputSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// `vte` performer that keeps printable text only
struct PlainText<'a> {
    out: &'a mut String,
    pending_cr: &'a mut bool,
    low_water: usize,
}

impl PlainText<'_> {
    fn pop(&mut self) {
        self.out.pop();
        self.low_water = self.low_water.min(self.out.len());
    }
}

impl Perform for PlainText<'_> {
    fn print(&mut self, c: char) {
        // ` \r` followed by more text on the same line is an autowrap
        if std::mem::take(self.pending_cr) && self.out.ends_with(' ') {
            self.pop();
        }
        self.out.push(c);
    }

    fn execute(&mut self, byte: u8) {
        if byte == b'\r' {
            *self.pending_cr = true;
            return;
        }
        *self.pending_cr = false;

        match byte {
            b'\n' => self.out.push('\n'),
            b'\t' => self.out.push('\t'),
            BACKSPACE => {
                if self.out.chars().next_back().is_some_and(|c| c != '\n') {
                    self.pop();
                }
            }
            // BEL and the remaining C0 controls carry no text
            _ => {}
        }
    }

    fn csi_dispatch(
        &mut self,
        _params: &Params,
        _intermediates: &[u8],
        _ignore: bool,
        _action: char,
    ) {
    }

    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}
}

/// Strip ANSI escape sequences and control characters from a complete string
pub fn strip_ansi(text: &str) -> String {
    OutputSanitizer::new().sanitize(text.as_bytes())
}
