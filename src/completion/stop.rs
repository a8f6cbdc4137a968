//! Stop conditions - patterns that end a generation early
//!
//! A stop condition is a literal string or a compiled regular expression.
//! Evaluation runs against the buffer's full joined text after every
//! fragment, so matches that straddle fragment boundaries fire the moment
//! the completing fragment arrives.

use regex::Regex;

/// A compiled stop pattern.
#[derive(Debug, Clone)]
pub enum StopCondition {
    Literal(String),
    Regex(Regex),
}

impl StopCondition {
    pub fn literal(pattern: impl Into<String>) -> Self {
        StopCondition::Literal(pattern.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(StopCondition::Regex(Regex::new(pattern)?))
    }

    /// Byte span `[start, end)` of the first occurrence in `text`.
    ///
    /// Empty literals never match; they would fire at offset 0 forever.
    pub fn find(&self, text: &str) -> Option<(usize, usize)> {
        match self {
            StopCondition::Literal(lit) => {
                if lit.is_empty() {
                    return None;
                }
                text.find(lit.as_str()).map(|start| (start, start + lit.len()))
            }
            StopCondition::Regex(re) => re.find(text).map(|m| (m.start(), m.end())),
        }
    }

    /// Human-readable pattern for logs and events.
    pub fn describe(&self) -> String {
        match self {
            StopCondition::Literal(lit) => format!("literal:{lit}"),
            StopCondition::Regex(re) => format!("regex:{}", re.as_str()),
        }
    }
}

/// The winning match of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopMatch {
    pub start: usize,
    pub end: usize,
    /// Registration index of the pattern that fired
    pub index: usize,
}

/// Search `text` against every condition.
///
/// The earliest match position wins across patterns; ties break by
/// registration order.
pub fn first_match(stops: &[StopCondition], text: &str) -> Option<StopMatch> {
    let mut winner: Option<StopMatch> = None;
    for (index, stop) in stops.iter().enumerate() {
        if let Some((start, end)) = stop.find(text) {
            // Strict comparison keeps the earlier-registered pattern on ties.
            if winner.map_or(true, |w| start < w.start) {
                winner = Some(StopMatch { start, end, index });
            }
        }
    }
    winner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_finds_first_occurrence() {
        let stop = StopCondition::literal("```");
        assert_eq!(stop.find("abc```def```"), Some((3, 6)));
    }

    #[test]
    fn empty_literal_never_matches() {
        let stop = StopCondition::literal("");
        assert_eq!(stop.find("anything"), None);
    }

    #[test]
    fn regex_spans_whitespace() {
        let stop = StopCondition::regex(r"```\s+").unwrap();
        assert_eq!(stop.find("x```\n\ny"), Some((1, 6)));
    }

    #[test]
    fn earliest_position_wins_across_patterns() {
        let stops = vec![
            StopCondition::literal("world"),
            StopCondition::literal("hello"),
        ];
        let m = first_match(&stops, "hello world").unwrap();
        assert_eq!(m.index, 1);
        assert_eq!((m.start, m.end), (0, 5));
    }

    #[test]
    fn registration_order_breaks_ties() {
        let stops = vec![StopCondition::literal("ab"), StopCondition::literal("abc")];
        let m = first_match(&stops, "xxabc").unwrap();
        assert_eq!(m.index, 0);
        assert_eq!((m.start, m.end), (2, 4));
    }

    #[test]
    fn no_match_returns_none() {
        let stops = vec![StopCondition::literal("!")];
        assert_eq!(first_match(&stops, "calm text"), None);
    }
}
