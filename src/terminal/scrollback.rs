//! Line Scrollback
//!
//! A minimal terminal emulator: a bounded list of rendered rows with a
//! cursor on the last one. It understands the handful of sequences shells
//! and line editors use to redraw the current line, which is enough for
//! reading command output back as plain text.
//!
//! Rows wrap at the terminal width the way xterm does, with a pending wrap
//! after the last column. Rows produced by a wrap are joined back onto the
//! row they continue, so readers see logical lines.

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::{Mutex, MutexGuard};
use vte::{Params, Parser, Perform};

use super::{ScrollbackSnapshot, TerminalEmulator};

const TAB_WIDTH: usize = 8;

/// Width used until the real one is known
pub const DEFAULT_COLUMNS: u16 = 80;

/// Characters that occupy no column in a real terminal
fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}')
}

/// One rendered row
#[derive(Debug, Clone, Default)]
struct Line {
    /// Zero-width text printed at column 0
    prefix: String,
    /// One entry per column; zero-width text rides along with its cell
    cells: Vec<String>,
    /// Continues the previous row after an autowrap
    wrapped: bool,
}

impl Line {
    fn continuation() -> Self {
        Self {
            wrapped: true,
            ..Self::default()
        }
    }

    fn push_text(&self, text: &mut String) {
        text.push_str(&self.prefix);
        for cell in &self.cells {
            text.push_str(cell);
        }
    }

    fn pad_to(&mut self, col: usize) {
        while self.cells.len() < col {
            self.cells.push(" ".to_string());
        }
    }
}

/// Join a row and its continuations into one line of text
fn render<'a>(rows: impl IntoIterator<Item = &'a Line>) -> String {
    let mut text = String::new();
    for row in rows {
        row.push_text(&mut text);
    }
    text.trim_end().to_string()
}

/// Screen state driven by `vte`
#[derive(Debug)]
struct Screen {
    lines: VecDeque<Line>,
    col: usize,
    /// The last column was written; the next printable wraps first
    wrap_pending: bool,
    width: usize,
    limit: usize,
}

impl Screen {
    fn new(limit: usize, width: usize) -> Self {
        let mut lines = VecDeque::new();
        lines.push_back(Line::default());
        Self {
            lines,
            col: 0,
            wrap_pending: false,
            width: width.max(1),
            limit: limit.max(1),
        }
    }

    fn current(&mut self) -> &mut Line {
        if self.lines.is_empty() {
            self.lines.push_back(Line::default());
        }
        let last = self.lines.len() - 1;
        &mut self.lines[last]
    }

    fn push_row(&mut self, row: Line) {
        self.lines.push_back(row);
        self.col = 0;
        self.wrap_pending = false;
        while self.lines.len() > self.limit {
            self.lines.pop_front();
        }
    }

    fn newline(&mut self) {
        self.push_row(Line::default());
    }

    fn clear_all(&mut self) {
        self.lines.clear();
        self.lines.push_back(Line::default());
        self.col = 0;
        self.wrap_pending = false;
    }

    fn set_width(&mut self, width: usize) {
        self.width = width.max(1);
        self.col = self.col.min(self.width - 1);
        self.wrap_pending = false;
    }

    /// Move the cursor within the row, cancelling a pending wrap
    fn move_to(&mut self, col: usize) {
        self.col = col.min(self.width - 1);
        self.wrap_pending = false;
    }

    fn erase_in_line(&mut self, mode: u16) {
        let col = self.col;
        let line = self.current();
        match mode {
            0 => line.cells.truncate(col),
            1 => {
                line.prefix.clear();
                for cell in line.cells.iter_mut().take(col + 1) {
                    *cell = " ".to_string();
                }
            }
            _ => {
                line.prefix.clear();
                line.cells.clear();
            }
        }
    }

    /// Row ranges making up each logical line, oldest first
    fn logical_lines(&self) -> Vec<Range<usize>> {
        let mut ranges: Vec<Range<usize>> = Vec::new();
        for (index, row) in self.lines.iter().enumerate() {
            match ranges.last_mut() {
                Some(range) if row.wrapped => range.end = index + 1,
                _ => ranges.push(index..index + 1),
            }
        }
        ranges
    }
}

/// First parameter of a CSI sequence, with a default for missing or zero
fn param(params: &Params, index: usize, default: u16) -> u16 {
    params
        .iter()
        .nth(index)
        .and_then(|p| p.first().copied())
        .filter(|&v| v != 0)
        .unwrap_or(default)
}

impl Perform for Screen {
    fn print(&mut self, c: char) {
        if is_zero_width(c) {
            // Attach to the cell under a pending wrap, else the one before
            let anchor = if self.wrap_pending {
                Some(self.col)
            } else {
                self.col.checked_sub(1)
            };
            let line = self.current();
            match anchor.and_then(|i| line.cells.get_mut(i)) {
                Some(cell) => cell.push(c),
                None => line.prefix.push(c),
            }
            return;
        }

        if self.wrap_pending {
            self.push_row(Line::continuation());
        }

        let col = self.col;
        let line = self.current();
        line.pad_to(col);
        if col < line.cells.len() {
            line.cells[col] = c.to_string();
        } else {
            line.cells.push(c.to_string());
        }

        if col + 1 >= self.width {
            self.wrap_pending = true;
        } else {
            self.col += 1;
        }
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' | 0x0b | 0x0c => self.newline(),
            b'\r' => self.move_to(0),
            0x08 => self.move_to(self.col.saturating_sub(1)),
            b'\t' => self.move_to((self.col / TAB_WIDTH + 1) * TAB_WIDTH),
            _ => {}
        }
    }

    fn csi_dispatch(
        &mut self,
        params: &Params,
        intermediates: &[u8],
        _ignore: bool,
        action: char,
    ) {
        // Private modes (`?2004h` and friends) never move text
        if !intermediates.is_empty() {
            return;
        }

        match action {
            'K' => self.erase_in_line(param(params, 0, 0)),
            'J' => match param(params, 0, 0) {
                0 => self.erase_in_line(0),
                _ => self.clear_all(),
            },
            'C' => self.move_to(self.col + param(params, 0, 1) as usize),
            'D' => self.move_to(self.col.saturating_sub(param(params, 0, 1) as usize)),
            'G' => self.move_to(param(params, 0, 1) as usize - 1),
            'H' | 'f' => self.move_to(param(params, 1, 1) as usize - 1),
            'P' => {
                let col = self.col;
                let count = param(params, 0, 1) as usize;
                let line = self.current();
                if col < line.cells.len() {
                    let end = (col + count).min(line.cells.len());
                    line.cells.drain(col..end);
                }
            }
            '@' => {
                let col = self.col;
                let width = self.width;
                let count = param(params, 0, 1) as usize;
                let line = self.current();
                if col < line.cells.len() {
                    for _ in 0..count {
                        line.cells.insert(col, " ".to_string());
                    }
                    line.cells.truncate(width);
                }
            }
            _ => {}
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], _ignore: bool, byte: u8) {
        // RIS
        if intermediates.is_empty() && byte == b'c' {
            self.clear_all();
        }
    }
}

struct Inner {
    parser: Parser,
    screen: Screen,
    generation: u64,
}

/// Bounded line scrollback rendered with `vte`
pub struct ScrollbackBuffer {
    inner: Mutex<Inner>,
}

impl ScrollbackBuffer {
    /// Create a scrollback keeping at most `limit` rows, [`DEFAULT_COLUMNS`] wide
    pub fn new(limit: usize) -> Self {
        Self::with_columns(limit, DEFAULT_COLUMNS)
    }

    /// Create a scrollback wrapping at `columns`
    pub fn with_columns(limit: usize, columns: u16) -> Self {
        Self {
            inner: Mutex::new(Inner {
                parser: Parser::new(),
                screen: Screen::new(limit, columns as usize),
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic mid-feed leaves the screen usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current wrap width
    pub fn columns(&self) -> usize {
        self.lock().screen.width
    }

    /// Full scrollback as text, mainly for diagnostics
    pub fn contents(&self) -> String {
        let inner = self.lock();
        let screen = &inner.screen;
        screen
            .logical_lines()
            .into_iter()
            .map(|rows| render(screen.lines.range(rows)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ScrollbackBuffer {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl TerminalEmulator for ScrollbackBuffer {
    fn feed(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut guard = self.lock();
        let Inner {
            parser,
            screen,
            generation,
        } = &mut *guard;
        parser.advance(screen, data);
        *generation += 1;
    }

    fn snapshot(&self) -> ScrollbackSnapshot {
        ScrollbackSnapshot::new(self.lock().generation)
    }

    fn line_count(&self) -> usize {
        self.lock().screen.logical_lines().len()
    }

    fn lines(&self, range: Range<usize>) -> Vec<String> {
        let inner = self.lock();
        let screen = &inner.screen;
        let logical = screen.logical_lines();
        let end = range.end.min(logical.len());
        let start = range.start.min(end);
        logical[start..end]
            .iter()
            .map(|rows| render(screen.lines.range(rows.clone())))
            .collect()
    }

    fn clear(&self) {
        let mut inner = self.lock();
        inner.screen.clear_all();
        inner.generation += 1;
    }

    fn resize(&self, cols: u16, _rows: u16) {
        let mut inner = self.lock();
        inner.screen.set_width(cols as usize);
        inner.generation += 1;
    }
}
