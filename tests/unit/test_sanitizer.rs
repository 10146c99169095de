//! Unit tests for the output sanitizer

use shellbridge::ansi::{strip_ansi, OutputSanitizer};
use shellbridge::models::ShellType;
use shellbridge::protocol::Sentinel;

#[cfg(test)]
mod sanitizer_tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(strip_ansi("Hello, World!"), "Hello, World!");
    }

    #[test]
    fn test_prompt_decorations_removed() {
        // Title, bracketed paste and a colored prompt, as bash emits them
        let raw = "\x1b]0;user@host: ~\x07\x1b[?2004h\x1b[01;32muser@host\x1b[00m:\x1b[01;34m~\x1b[00m$ ";
        assert_eq!(strip_ansi(raw), "user@host:~$ ");
    }

    #[test]
    fn test_crlf_becomes_lf() {
        assert_eq!(strip_ansi("one\r\ntwo\r\n"), "one\ntwo\n");
    }

    #[test]
    fn test_readline_wrap_artifact() {
        assert_eq!(strip_ansi("abc \x08def"), "abcdef");
    }

    #[test]
    fn test_sentinel_survives_sanitizing() {
        let sentinel = Sentinel::from_nonce(ShellType::Bash, 0x1234);
        let raw = format!("\x1b[0m{}\x1b[1m$ \x1b[0m", sentinel.as_str());
        assert_eq!(strip_ansi(&raw), format!("{}$ ", sentinel.as_str()));
    }

    #[test]
    fn test_sentinel_split_across_chunks() {
        let sentinel = Sentinel::from_nonce(ShellType::Bash, 0xBEEF);
        let raw = format!("done\r\n\x1b[0m{}$ ", sentinel.as_str());
        let bytes = raw.as_bytes();

        for split in 1..bytes.len() {
            let mut sanitizer = OutputSanitizer::new();
            let mut out = sanitizer.sanitize(&bytes[..split]);
            out.push_str(&sanitizer.sanitize(&bytes[split..]));
            assert_eq!(out, format!("done\n{}$ ", sentinel.as_str()), "split at {split}");
        }
    }

    #[test]
    fn test_reset_discards_partial_sequence() {
        let mut sanitizer = OutputSanitizer::new();
        assert_eq!(sanitizer.sanitize(b"a\x1b["), "a");
        sanitizer.reset();
        assert_eq!(sanitizer.sanitize(b"31mb"), "31mb");
    }
}
