//! Generation source abstraction layer
//!
//! A [`GenerationSource`] is an asynchronous producer of text fragments for
//! a `(context, model, temperature)` request. The returned stream is
//! closable early — dropping it releases the upstream connection without
//! consuming the rest of the generation — and may yield zero or more
//! fragments before ending.
//!
//! Implementations:
//! - [`OpenAiSource`]: OpenAI-compatible chat-completions endpoint (SSE)
//! - [`MockSource`]: scripted fragment source for tests
//!
//! Context shapes accepted from callers: a single string, a list of string
//! fragments, or a structured conversation of role-tagged turns. See
//! [`Context::normalize`] for the coercion rules.

pub mod openai;

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiSource;

/// Default model when neither config nor builder names one
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a structured conversation context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One element of a mixed context list: a bare string or a structured turn
#[derive(Debug, Clone, PartialEq)]
pub enum ContextPart {
    Text(String),
    Turn(Turn),
}

/// A caller-supplied generation context, prior to normalization
#[derive(Debug, Clone, PartialEq)]
pub enum Context {
    Text(String),
    Parts(Vec<ContextPart>),
}

impl Context {
    /// Normalize into the representation the generation source expects.
    ///
    /// - a single string stays a string;
    /// - a list of bare strings is concatenated into one string;
    /// - a mixture of structured turns and bare strings coerces the bare
    ///   strings into user turns and passes structured turns through.
    pub fn normalize(self) -> NormalizedContext {
        match self {
            Context::Text(text) => NormalizedContext::Text(text),
            Context::Parts(parts) => {
                if parts.iter().all(|p| matches!(p, ContextPart::Text(_))) {
                    let mut joined = String::new();
                    for part in parts {
                        if let ContextPart::Text(t) = part {
                            joined.push_str(&t);
                        }
                    }
                    NormalizedContext::Text(joined)
                } else {
                    let turns = parts
                        .into_iter()
                        .map(|part| match part {
                            ContextPart::Text(t) => Turn::user(t),
                            ContextPart::Turn(turn) => turn,
                        })
                        .collect();
                    NormalizedContext::Turns(turns)
                }
            }
        }
    }
}

impl From<&str> for Context {
    fn from(text: &str) -> Self {
        Context::Text(text.to_string())
    }
}

impl From<String> for Context {
    fn from(text: String) -> Self {
        Context::Text(text)
    }
}

impl From<Vec<String>> for Context {
    fn from(fragments: Vec<String>) -> Self {
        Context::Parts(fragments.into_iter().map(ContextPart::Text).collect())
    }
}

impl From<Vec<Turn>> for Context {
    fn from(turns: Vec<Turn>) -> Self {
        Context::Parts(turns.into_iter().map(ContextPart::Turn).collect())
    }
}

impl From<Vec<ContextPart>> for Context {
    fn from(parts: Vec<ContextPart>) -> Self {
        Context::Parts(parts)
    }
}

/// A normalized context, ready to be shipped to a generation source
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedContext {
    Text(String),
    Turns(Vec<Turn>),
}

impl NormalizedContext {
    /// Wire representation: a bare string becomes a single user turn.
    pub fn into_turns(self) -> Vec<Turn> {
        match self {
            NormalizedContext::Text(text) => vec![Turn::user(text)],
            NormalizedContext::Turns(turns) => turns,
        }
    }
}

/// One generation request
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub context: NormalizedContext,
    pub model: String,
    pub temperature: f64,
}

/// Stream of generated text fragments.
///
/// Dropping the stream closes the upstream generation early.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Asynchronous producer of text fragments for a generation request
#[async_trait]
pub trait GenerationSource: Send + Sync {
    /// Open a fragment stream for the request.
    ///
    /// May yield zero or more fragments before ending; errors mid-stream
    /// surface as `Err` items.
    async fn stream(&self, request: GenerationRequest) -> Result<FragmentStream>;

    /// Source name for logs and events (e.g. "openai", "mock")
    fn name(&self) -> &str;

    /// Default model for this source
    fn default_model(&self) -> &str {
        OPENAI_DEFAULT_MODEL
    }
}

/// Scripted fragment source for tests.
///
/// Each call to [`GenerationSource::stream`] pops the next script; when the
/// scripts run out, the last one repeats. An optional per-fragment delay
/// simulates network pacing, and a script can be armed to fail after N
/// fragments.
pub struct MockSource {
    scripts: Mutex<VecDeque<Vec<String>>>,
    fallback: Vec<String>,
    delay: Option<Duration>,
    fail_after: Option<(usize, String)>,
    calls: AtomicUsize,
}

impl MockSource {
    /// A source that replays the same fragment list on every call.
    pub fn new<I, S>(fragments: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments: Vec<String> = fragments.into_iter().map(Into::into).collect();
        Arc::new(Self {
            scripts: Mutex::new(VecDeque::new()),
            fallback: fragments,
            delay: None,
            fail_after: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// A source that replays one script per call, in order.
    pub fn scripted<I, S>(scripts: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Vec<S>>,
        S: Into<String>,
    {
        let mut queue: VecDeque<Vec<String>> = scripts
            .into_iter()
            .map(|s| s.into_iter().map(Into::into).collect())
            .collect();
        let fallback = queue.back().cloned().unwrap_or_default();
        if queue.len() == 1 {
            queue.clear();
        }
        Arc::new(Self {
            scripts: Mutex::new(queue),
            fallback,
            delay: None,
            fail_after: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// Same fragments, but paced with a delay between each.
    pub fn with_delay<I, S>(fragments: I, delay: Duration) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments: Vec<String> = fragments.into_iter().map(Into::into).collect();
        Arc::new(Self {
            scripts: Mutex::new(VecDeque::new()),
            fallback: fragments,
            delay: Some(delay),
            fail_after: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// One script per call, paced with a delay between fragments.
    pub fn scripted_with_delay<I, S>(scripts: I, delay: Duration) -> Arc<Self>
    where
        I: IntoIterator<Item = Vec<S>>,
        S: Into<String>,
    {
        let mut queue: VecDeque<Vec<String>> = scripts
            .into_iter()
            .map(|s| s.into_iter().map(Into::into).collect())
            .collect();
        let fallback = queue.back().cloned().unwrap_or_default();
        if queue.len() == 1 {
            queue.clear();
        }
        Arc::new(Self {
            scripts: Mutex::new(queue),
            fallback,
            delay: Some(delay),
            fail_after: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// A source that yields `n` fragments then raises `error`.
    pub fn failing_after<I, S>(fragments: I, n: usize, error: impl Into<String>) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments: Vec<String> = fragments.into_iter().map(Into::into).collect();
        Arc::new(Self {
            scripts: Mutex::new(VecDeque::new()),
            fallback: fragments,
            delay: None,
            fail_after: Some((n, error.into())),
            calls: AtomicUsize::new(0),
        })
    }

    /// Number of stream() calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Vec<String> {
        self.scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl GenerationSource for MockSource {
    async fn stream(&self, _request: GenerationRequest) -> Result<FragmentStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fragments = self.next_script();
        let delay = self.delay;
        let fail_after = self.fail_after.clone();

        let stream = futures::stream::unfold(
            (fragments.into_iter(), 0usize, fail_after, delay),
            |(mut iter, yielded, fail_after, delay)| async move {
                if let Some((n, ref msg)) = fail_after {
                    if yielded >= n {
                        // Yield the error once, then end the stream.
                        return if yielded == n {
                            Some((
                                Err(anyhow::anyhow!("{msg}")),
                                (iter, yielded + 1, fail_after.clone(), delay),
                            ))
                        } else {
                            None
                        };
                    }
                }
                let fragment = iter.next()?;
                if let Some(d) = delay {
                    tokio::time::sleep(d).await;
                }
                Some((Ok(fragment), (iter, yielded + 1, fail_after, delay)))
            },
        );
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
