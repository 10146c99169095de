//! Property-based tests for output truncation

use proptest::prelude::*;
use shellbridge::config::OutputConfig;
use shellbridge::protocol::truncate_output;

fn config() -> impl Strategy<Value = OutputConfig> {
    (10usize..200, 1usize..20000).prop_flat_map(|(max_lines, max_chars)| {
        (1..max_lines / 2, 1..max_lines / 2).prop_map(move |(head_lines, tail_lines)| OutputConfig {
            max_lines,
            max_chars,
            head_lines,
            tail_lines,
        })
    })
}

proptest! {
    #[test]
    fn test_within_budget_is_identity(
        lines in prop::collection::vec("[a-z0-9 ]{0,20}", 0..50),
    ) {
        let text = lines.join("\n");
        let config = OutputConfig {
            max_lines: 100,
            max_chars: 5000,
            head_lines: 40,
            tail_lines: 40,
        };
        prop_assert_eq!(truncate_output(&text, &config), text);
    }

    #[test]
    fn test_head_and_tail_are_kept(
        count in 101usize..400,
        config in config(),
    ) {
        let lines: Vec<String> = (0..count).map(|i| format!("line{}", i)).collect();
        let text = lines.join("\n");
        let config = OutputConfig { max_chars: usize::MAX, ..config };
        let out = truncate_output(&text, &config);

        if count > config.max_lines {
            let omitted = count - config.head_lines - config.tail_lines;
            let marker = format!("... [{} lines omitted] ...", omitted);
            prop_assert!(out.contains(&marker));
            prop_assert_eq!(out.lines().count(), config.head_lines + config.tail_lines + 1);
            prop_assert!(out.starts_with("line0\n"));
            let last = format!("\nline{}", count - 1);
            prop_assert!(out.ends_with(&last));
        } else {
            prop_assert_eq!(out, text);
        }
    }

    #[test]
    fn test_character_budget_is_respected(
        text in "[a-zé\n]{0,3000}",
        max_chars in 2usize..2000,
    ) {
        let config = OutputConfig {
            max_lines: usize::MAX,
            max_chars,
            head_lines: 0,
            tail_lines: 0,
        };
        let out = truncate_output(&text, &config);
        let original = text.chars().count();

        if original > max_chars {
            let keep = max_chars / 2;
            let marker = format!("... [{} characters omitted] ...", original - 2 * keep);
            prop_assert!(out.contains(&marker));
            let head: String = text.chars().take(keep).collect();
            prop_assert!(out.starts_with(&head));
        } else {
            prop_assert_eq!(out, text);
        }
    }
}
