//! Completion lifecycle events
//!
//! Append-only, sequence-numbered log of what happened to each completion:
//! start, fragment arrival, stop matches, terminal transitions, and chain
//! hand-offs. One log per template instance; standalone completions default
//! to [`NoopEmitter`].
//!
//! The [`EventEmitter`] trait enables dependency injection: a shared
//! [`EventLog`] in production, `NoopEmitter` or a custom mock in tests.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

/// What happened, keyed by the completion's id (and hole name if any).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    CompletionStarted {
        completion: String,
        name: Option<String>,
        model: String,
    },
    FragmentReceived {
        completion: String,
        chars: usize,
    },
    StopMatched {
        completion: String,
        pattern: String,
        offset: usize,
    },
    CompletionFinished {
        completion: String,
        chars: usize,
    },
    CompletionFailed {
        completion: String,
        error: String,
    },
    ChainAdvanced {
        from: String,
        to: String,
    },
}

/// A recorded event with its sequence number.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Event {
    pub seq: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Thread-safe append-only event log.
///
/// Cloning shares the underlying storage (Arc), matching how one log is
/// threaded through a template instance and all of its completions.
#[derive(Clone, Default)]
pub struct EventLog {
    inner: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event; returns its sequence number.
    pub fn emit(&self, kind: EventKind) -> u64 {
        let mut events = self.inner.lock();
        let seq = events.len() as u64;
        events.push(Event { seq, kind });
        seq
    }

    /// Snapshot of all events recorded so far.
    pub fn snapshot(&self) -> Vec<Event> {
        self.inner.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Trait for emitting events during completion execution
pub trait EventEmitter: Send + Sync {
    /// Emit an event and return its sequence number
    fn emit(&self, kind: EventKind) -> u64;
}

impl EventEmitter for EventLog {
    fn emit(&self, kind: EventKind) -> u64 {
        EventLog::emit(self, kind)
    }
}

/// No-op emitter (zero allocation, always returns 0)
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl EventEmitter for NoopEmitter {
    fn emit(&self, _kind: EventKind) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_sequence_numbered() {
        let log = EventLog::new();
        let a = log.emit(EventKind::FragmentReceived {
            completion: "c1".to_string(),
            chars: 5,
        });
        let b = log.emit(EventKind::FragmentReceived {
            completion: "c1".to_string(),
            chars: 3,
        });
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn clones_share_storage() {
        let log = EventLog::new();
        let clone = log.clone();
        clone.emit(EventKind::ChainAdvanced {
            from: "x".to_string(),
            to: "y".to_string(),
        });
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn emitter_trait_is_object_safe() {
        fn accepts_emitter(_: &dyn EventEmitter) {}

        let log = EventLog::new();
        accepts_emitter(&log);
        accepts_emitter(&NoopEmitter::new());
    }

    #[test]
    fn noop_emitter_records_nothing() {
        let noop = NoopEmitter::new();
        assert_eq!(
            noop.emit(EventKind::CompletionFinished {
                completion: "c1".to_string(),
                chars: 0,
            }),
            0
        );
    }
}
