//! FragmentBuffer - the growing text buffer behind a completion
//!
//! Keeps the received fragments in arrival order plus a cached joined view
//! so stop-condition evaluation never re-concatenates. Tail trimming walks
//! backward across fragment boundaries, popping fragments that become
//! empty.

/// Ordered list of received text fragments with a cached joined view.
#[derive(Debug, Clone, Default)]
pub struct FragmentBuffer {
    fragments: Vec<String>,
    joined: String,
}

impl FragmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fragment.
    pub fn push(&mut self, fragment: String) {
        self.joined.push_str(&fragment);
        self.fragments.push(fragment);
    }

    /// The full joined text.
    pub fn text(&self) -> &str {
        &self.joined
    }

    /// Joined length in bytes.
    pub fn len(&self) -> usize {
        self.joined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joined.is_empty()
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn fragment(&self, index: usize) -> Option<&str> {
        self.fragments.get(index).map(String::as_str)
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Discard everything past byte offset `keep` of the joined text.
    ///
    /// `keep` must lie on a character boundary of the joined text (stop
    /// matches always do). Removal proceeds from the tail of the last
    /// fragment backward, popping fragments that empty out, so a discard
    /// larger than the most recent fragment walks across boundaries.
    pub fn truncate_to(&mut self, keep: usize) {
        debug_assert!(keep <= self.joined.len());
        debug_assert!(self.joined.is_char_boundary(keep));

        while self.joined.len() > keep {
            let excess = self.joined.len() - keep;
            let last = match self.fragments.last_mut() {
                Some(f) => f,
                None => break,
            };
            if last.len() <= excess {
                let removed = last.len();
                self.fragments.pop();
                self.joined.truncate(self.joined.len() - removed);
            } else {
                let cut = last.len() - excess;
                last.truncate(cut);
                self.joined.truncate(keep);
            }
        }
    }

    /// Consume the buffer, returning the joined text.
    pub fn into_text(self) -> String {
        self.joined
    }
}
