//! Result Extraction
//!
//! Reads a finished command's output back from the rendered scrollback and
//! keeps it within the configured budget.

use crate::config::OutputConfig;
use crate::models::CompletionSignal;
use crate::terminal::PromptDetector;

/// Acknowledgement returned for background dispatches
pub const BACKGROUND_STARTED: &str = "Command started in background";

/// Locate the captured output between the command's echo and the newest prompt
///
/// `lines` is the tail of the scrollback. The newest prompt is the last line
/// carrying the completion signal; the echo is the last line before it that
/// contains `marker`. When the echo cannot be found, capture starts after the
/// previous prompt line, or at the top of the window if there is none.
pub fn extract_output(
    lines: &[String],
    marker: Option<&str>,
    signal: &CompletionSignal,
    prompt: &PromptDetector,
) -> String {
    let is_prompt_line = |line: &str| match signal {
        CompletionSignal::Sentinel(sentinel) => line.contains(sentinel.as_str()),
        CompletionSignal::PromptHeuristic => prompt.is_prompt(line),
    };

    let prompt_index = lines
        .iter()
        .rposition(|line| is_prompt_line(line))
        .unwrap_or(lines.len());

    let before_prompt = &lines[..prompt_index];
    let start = marker
        .and_then(|marker| {
            // Prefer the echo on a prompt line; output may repeat the command text
            before_prompt
                .iter()
                .rposition(|line| line.contains(marker) && is_prompt_line(line))
                .or_else(|| before_prompt.iter().rposition(|line| line.contains(marker)))
        })
        .or_else(|| before_prompt.iter().rposition(|line| is_prompt_line(line)))
        .map(|index| index + 1)
        .unwrap_or(0);

    let mut captured: Vec<String> = before_prompt[start..].to_vec();

    // Output without a trailing newline shares the prompt line
    if let (CompletionSignal::Sentinel(sentinel), Some(prompt_line)) =
        (signal, lines.get(prompt_index))
    {
        if let Some(pos) = prompt_line.find(sentinel.as_str()) {
            let partial = &prompt_line[..pos];
            if !partial.trim().is_empty() {
                captured.push(partial.to_string());
            }
        }
    }

    if let CompletionSignal::Sentinel(sentinel) = signal {
        for line in &mut captured {
            if line.contains(sentinel.as_str()) {
                *line = line.replace(sentinel.as_str(), "");
            }
        }
    }

    trim_blank_lines(&captured).join("\n")
}

/// Drop leading and trailing blank lines
fn trim_blank_lines(lines: &[String]) -> &[String] {
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());
    match (first, last) {
        (Some(first), Some(last)) => &lines[first..=last],
        _ => &[],
    }
}

/// Keep output within the line and character budget
///
/// Over `max_lines`, the first `head_lines` and last `tail_lines` lines are
/// kept around a `... [N lines omitted] ...` marker. If the result is still
/// over `max_chars`, half the budget is kept from each end around a
/// `... [N characters omitted] ...` marker. Output within budget is returned
/// unchanged.
pub fn truncate_output(text: &str, config: &OutputConfig) -> String {
    let lines: Vec<&str> = text.lines().collect();

    let mut result = if lines.len() > config.max_lines {
        let head = config.head_lines.min(lines.len());
        let tail = config.tail_lines.min(lines.len() - head);
        let omitted = lines.len() - head - tail;
        format!(
            "{}\n... [{} lines omitted] ...\n{}",
            lines[..head].join("\n"),
            omitted,
            lines[lines.len() - tail..].join("\n")
        )
    } else {
        text.to_string()
    };

    let char_count = result.chars().count();
    if char_count > config.max_chars {
        let keep = config.max_chars / 2;
        let head: String = result.chars().take(keep).collect();
        let tail: String = result.chars().skip(char_count - keep).collect();
        let omitted = char_count - 2 * keep;
        result = format!("{}\n... [{} characters omitted] ...\n{}", head, omitted, tail);
    }

    result
}
