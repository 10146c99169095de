//! Property-based tests for the output sanitizer
//!
//! Random text wrapped in escape sequences and split at arbitrary points
//! must come out the same as the one-shot form.

use proptest::prelude::*;
use shellbridge::ansi::{strip_ansi, OutputSanitizer};

/// Escape sequences a shell commonly emits
fn escape() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u8..108).prop_map(|n| format!("\x1b[{}m", n)),
        (1u16..200).prop_map(|n| format!("\x1b[{}C", n)),
        Just("\x1b[K".to_string()),
        Just("\x1b[?2004h".to_string()),
        "[a-z ]{0,12}".prop_map(|t| format!("\x1b]0;{}\x07", t)),
    ]
}

fn decorated() -> impl Strategy<Value = String> {
    prop::collection::vec(("[a-zA-Z0-9 .:/\u{2060}\u{200b}\u{200c}\u{200d}é]{0,8}", escape()), 0..16)
        .prop_map(|parts| {
            parts
                .into_iter()
                .map(|(text, esc)| format!("{}{}", esc, text))
                .collect()
        })
}

proptest! {
    #[test]
    fn test_sanitizer_doesnt_panic_on_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut sanitizer = OutputSanitizer::new();
        let _ = sanitizer.sanitize(&bytes);
    }

    #[test]
    fn test_plain_text_is_unchanged(s in "[a-zA-Z0-9 .,:/_-]{0,200}") {
        prop_assert_eq!(strip_ansi(&s), s);
    }

    #[test]
    fn test_output_has_no_escape_bytes(s in decorated()) {
        let clean = strip_ansi(&s);
        prop_assert!(!clean.contains('\x1b'));
        prop_assert!(!clean.contains('\x07'));
    }

    #[test]
    fn test_chunking_does_not_change_output(s in decorated(), split in any::<prop::sample::Index>()) {
        let bytes = s.as_bytes();
        let at = split.index(bytes.len() + 1);

        let mut sanitizer = OutputSanitizer::new();
        let mut chunked = sanitizer.sanitize(&bytes[..at]);
        chunked.push_str(&sanitizer.sanitize(&bytes[at..]));

        prop_assert_eq!(chunked, strip_ansi(&s));
    }

    #[test]
    fn test_zero_width_text_survives(s in "[\u{2060}\u{200b}\u{200c}\u{200d}]{1,20}", esc in escape()) {
        let raw = format!("{}{}{}", esc, s, esc);
        prop_assert_eq!(strip_ansi(&raw), s);
    }
}
