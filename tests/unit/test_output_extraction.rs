//! Unit tests for result extraction against a rendered scrollback

use shellbridge::config::OutputConfig;
use shellbridge::models::{CompletionSignal, ShellType};
use shellbridge::protocol::{extract_output, truncate_output, Sentinel};
use shellbridge::terminal::{PromptDetector, ScrollbackBuffer, TerminalEmulator};

fn sentinel() -> Sentinel {
    Sentinel::from_nonce(ShellType::Bash, 0x0F0F)
}

/// Render raw shell output and extract the result for `marker`
fn run(raw: &str, marker: &str) -> String {
    let scrollback = ScrollbackBuffer::new(1000);
    scrollback.feed(raw.as_bytes());
    let signal = CompletionSignal::Sentinel(sentinel().as_str().to_string());
    extract_output(
        &scrollback.tail(200),
        Some(marker),
        &signal,
        &PromptDetector::new(),
    )
}

#[cfg(test)]
mod extraction_tests {
    use super::*;

    #[test]
    fn test_extract_from_rendered_session() {
        let s = sentinel();
        let raw = format!(
            "{s}$ ^C\r\n{s}$ echo hi\r\nhi\r\n{s}$ ",
            s = s.as_str()
        );
        assert_eq!(run(&raw, "echo hi"), "hi");
    }

    #[test]
    fn test_extract_after_line_editor_redraw() {
        let s = sentinel();
        // zle-style redraw: the typed line is erased and repainted
        let raw = format!(
            "{s}$ ec\x1b[2K\r{s}$ echo hi\r\nhi\r\n{s}$ ",
            s = s.as_str()
        );
        assert_eq!(run(&raw, "echo hi"), "hi");
    }

    #[test]
    fn test_extract_command_wider_than_terminal() {
        let s = sentinel();
        let arg = "x".repeat(150);
        let command = format!("echo {}", arg);

        // Readline wraps the echo with ` \r` at the 80th column
        let mut echo = String::new();
        let mut col = 2;
        for c in command.chars() {
            echo.push(c);
            col += 1;
            if col == 80 {
                echo.push_str(" \r");
                col = 0;
            }
        }
        let raw = format!(
            "{s}$ echo first-output\r\nfirst-output\r\n{s}$ ^C\r\n{s}$ {echo}\r\n{arg}\r\n{s}$ ",
            s = s.as_str()
        );
        assert_eq!(run(&raw, &command), arg);
    }

    #[test]
    fn test_extract_progress_bar_output() {
        let s = sentinel();
        let raw = format!(
            "{s}$ fetch\r\n 10%\r 55%\r100%\r\nok\r\n{s}$ ",
            s = s.as_str()
        );
        assert_eq!(run(&raw, "fetch"), "100%\nok");
    }

    #[test]
    fn test_extract_empty_output() {
        let s = sentinel();
        let raw = format!("{s}$ true\r\n{s}$ ", s = s.as_str());
        assert_eq!(run(&raw, "true"), "");
    }

    #[test]
    fn test_extract_then_truncate() {
        let s = sentinel();
        let mut raw = format!("{}$ seq 300\r\n", s.as_str());
        for i in 1..=300 {
            raw.push_str(&format!("{}\r\n", i));
        }
        raw.push_str(&format!("{}$ ", s.as_str()));

        // Only the last 200 lines are scanned, so the echo is gone
        let extracted = run(&raw, "seq 300");
        assert_eq!(extracted.lines().next(), Some("102"));

        let truncated = truncate_output(&extracted, &OutputConfig::default());
        assert!(truncated.contains("... [119 lines omitted] ..."));
        assert!(truncated.ends_with("300"));
    }
}
