//! Template Lexer - segment classification
//!
//! Splits template text into literal, variable (`{…}`), and hole (`[…]`)
//! segments. A backslash before `{`, `}`, `[`, `]`, or `\` renders that
//! character literally and never opens or closes a segment.
//!
//! Algorithm: a pre-pass replaces escaped delimiters with private-use
//! sentinel characters, one non-greedy regex partitions the text at the
//! outermost `{…}`/`[…]` spans (non-nested), then sentinels are restored
//! per segment. Unmatched single delimiters fall through as literal text;
//! the lexer never fails. Empty names lex fine and are rejected later at
//! binding time.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Kind of a template segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Literal,
    Variable,
    Hole,
}

/// One lexed segment: kind plus content (delimiters stripped, escapes
/// resolved).
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
}

impl Segment {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Literal,
            text: text.into(),
        }
    }
}

// Private-use sentinels; they cannot collide with template text short of
// the caller deliberately embedding private-use codepoints.
const MASK_BACKSLASH: char = '\u{E000}';
const MASK_OPEN_BRACE: char = '\u{E001}';
const MASK_CLOSE_BRACE: char = '\u{E002}';
const MASK_OPEN_BRACKET: char = '\u{E003}';
const MASK_CLOSE_BRACKET: char = '\u{E004}';

/// Any escaped character (the escape marker plus what follows)
static ESCAPE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\.").unwrap());

/// Outermost non-greedy `{…}` / `[…]` spans
static SPAN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{.*?\}|\[.*?\]").unwrap());

fn mask_escapes(text: &str) -> std::borrow::Cow<'_, str> {
    ESCAPE_RE.replace_all(text, |caps: &Captures| {
        match &caps[0] {
            r"\{" => MASK_OPEN_BRACE.to_string(),
            r"\}" => MASK_CLOSE_BRACE.to_string(),
            r"\[" => MASK_OPEN_BRACKET.to_string(),
            r"\]" => MASK_CLOSE_BRACKET.to_string(),
            r"\\" => MASK_BACKSLASH.to_string(),
            // Unknown escapes pass through untouched
            other => other.to_string(),
        }
    })
}

fn restore(segment: &str) -> String {
    segment
        .replace(MASK_OPEN_BRACE, "{")
        .replace(MASK_CLOSE_BRACE, "}")
        .replace(MASK_OPEN_BRACKET, "[")
        .replace(MASK_CLOSE_BRACKET, "]")
        .replace(MASK_BACKSLASH, "\\")
}

/// Lex template text into a segment sequence.
pub fn lex(text: &str) -> Vec<Segment> {
    let masked = mask_escapes(text);
    let mut segments = Vec::new();
    let mut last = 0;

    for span in SPAN_RE.find_iter(&masked) {
        if span.start() > last {
            segments.push(Segment::literal(restore(&masked[last..span.start()])));
        }
        let kind = if masked[span.start()..].starts_with('{') {
            SegmentKind::Variable
        } else {
            SegmentKind::Hole
        };
        let body = &masked[span.start() + 1..span.end() - 1];
        segments.push(Segment {
            kind,
            text: restore(body),
        });
        last = span.end();
    }
    if last < masked.len() {
        segments.push(Segment::literal(restore(&masked[last..])));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(segments: &[Segment]) -> Vec<SegmentKind> {
        segments.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn classifies_all_three_kinds() {
        let segments = lex("What is an {x}? An {x} is [answer].");
        assert_eq!(
            kinds(&segments),
            vec![
                SegmentKind::Literal,
                SegmentKind::Variable,
                SegmentKind::Literal,
                SegmentKind::Variable,
                SegmentKind::Literal,
                SegmentKind::Hole,
                SegmentKind::Literal,
            ]
        );
        assert_eq!(segments[1].text, "x");
        assert_eq!(segments[5].text, "answer");
    }

    #[test]
    fn literal_only_template_is_one_segment() {
        let segments = lex("just plain text");
        assert_eq!(segments, vec![Segment::literal("just plain text")]);
    }

    #[test]
    fn escaped_delimiters_stay_literal() {
        let segments = lex(r"These are escaped \[something\] and \{something\}");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].kind, SegmentKind::Literal);
        assert_eq!(segments[0].text, "These are escaped [something] and {something}");
    }

    #[test]
    fn escaped_backslash_resolves() {
        let segments = lex(r"Whats this \\? and this \\[x]");
        assert_eq!(
            kinds(&segments),
            vec![SegmentKind::Literal, SegmentKind::Hole]
        );
        assert_eq!(segments[0].text, r"Whats this \? and this \");
        assert_eq!(segments[1].text, "x");
    }

    #[test]
    fn unknown_escape_passes_through() {
        let segments = lex(r"a\nb");
        assert_eq!(segments, vec![Segment::literal(r"a\nb")]);
    }

    #[test]
    fn unmatched_delimiters_are_literal() {
        let segments = lex("an { open and a ] close");
        assert_eq!(segments, vec![Segment::literal("an { open and a ] close")]);
    }

    #[test]
    fn empty_names_lex_without_error() {
        let segments = lex("a {} and a []");
        assert_eq!(
            kinds(&segments),
            vec![
                SegmentKind::Literal,
                SegmentKind::Variable,
                SegmentKind::Literal,
                SegmentKind::Hole,
            ]
        );
        assert_eq!(segments[1].text, "");
        assert_eq!(segments[3].text, "");
    }

    #[test]
    fn hole_with_stop_pattern_keeps_pattern_text() {
        let segments = lex(r"One kind of {x} is a [name:(\.|,)].");
        let hole = segments.iter().find(|s| s.kind == SegmentKind::Hole).unwrap();
        assert_eq!(hole.text, r"name:(\.|,)");
    }

    #[test]
    fn spans_do_not_cross_newlines() {
        let segments = lex("open { no close\nhere }");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].kind, SegmentKind::Literal);
    }

    #[test]
    fn multiline_template_keeps_literal_newlines() {
        let segments = lex("One kind of {x} is a [name].\n\n5 {name}s makes a [group].");
        let literal = &segments[4];
        assert_eq!(literal.kind, SegmentKind::Literal);
        assert_eq!(literal.text, ".\n\n5 ");
    }
}
