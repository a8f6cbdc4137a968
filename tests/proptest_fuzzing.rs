//! Property-based fuzzing for the lexer, buffer trimming, and stop search

use proptest::prelude::*;

use weft::completion::{first_match, FragmentBuffer, StopCondition};
use weft::template::{lex, SegmentKind};

/// Escape every delimiter and backslash so the text must lex as literal.
fn escape_all(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '{' | '}' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

proptest! {
    #[test]
    fn lexing_never_panics(text in ".*") {
        let _ = lex(&text);
    }

    #[test]
    fn fully_escaped_text_round_trips_as_one_literal(text in "[\\x20-\\x7E]+") {
        let segments = lex(&escape_all(&text));
        prop_assert_eq!(segments.len(), 1);
        prop_assert_eq!(segments[0].kind, SegmentKind::Literal);
        prop_assert_eq!(&segments[0].text, &text);
    }

    #[test]
    fn segments_reassemble_the_masked_source(
        literals in proptest::collection::vec("[a-z ]{0,8}", 1..5),
        names in proptest::collection::vec("[a-z_]{1,6}", 1..4),
    ) {
        // Interleave literals and holes into a well-formed template
        let mut template = String::new();
        for (i, name) in names.iter().enumerate() {
            template.push_str(&literals[i % literals.len()]);
            template.push('[');
            template.push_str(name);
            template.push(']');
        }
        let segments = lex(&template);
        let holes: Vec<_> = segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Hole)
            .map(|s| s.text.clone())
            .collect();
        prop_assert_eq!(holes, names);
    }

    #[test]
    fn buffer_truncation_matches_string_truncation(
        fragments in proptest::collection::vec("[a-zA-Z0-9 ]{1,12}", 1..8),
        cut_ratio in 0.0f64..1.0,
    ) {
        let mut buffer = FragmentBuffer::new();
        for fragment in &fragments {
            buffer.push(fragment.clone());
        }
        let joined: String = fragments.concat();
        let keep = (joined.len() as f64 * cut_ratio) as usize;

        buffer.truncate_to(keep);
        prop_assert_eq!(buffer.text(), &joined[..keep]);
        // Fragments emptied by the trim are popped, never left behind
        prop_assert!(buffer.fragments().iter().all(|f| !f.is_empty()));
    }

    #[test]
    fn literal_stop_search_agrees_with_str_find(
        haystack in "[ab!.]{0,30}",
        needle in "[ab!.]{1,3}",
    ) {
        let stops = [StopCondition::literal(needle.clone())];
        let found = first_match(&stops, &haystack).map(|m| (m.start, m.end));
        let expected = haystack.find(&needle).map(|s| (s, s + needle.len()));
        prop_assert_eq!(found, expected);
    }
}
