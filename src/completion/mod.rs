//! Streaming completion - the per-hole state machine
//!
//! A [`Completion`] owns one generation task: a growing fragment buffer, a
//! stop-condition set, and future-like synchronization for arbitrary
//! concurrent observers. States:
//!
//! ```text
//! Pending --start()--> Running --stop matched / source exhausted--> Finalizing
//!     Finalizing --buffer frozen--> Finished
//!     Running|Finalizing --failure--> Error (terminal)
//! ```
//!
//! The consumption task runs on the shared [`Scheduler`]; every observer
//! (status reads, blocking `result()`, callbacks, the fragment iterator)
//! goes through one lock scoped to this completion. Nothing mutates after
//! a terminal state.

mod buffer;
mod stop;

pub use buffer::FragmentBuffer;
pub use stop::{first_match, StopCondition, StopMatch};

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::StreamExt;
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{FailureInfo, Result, WeftError};
use crate::event::{EventEmitter, EventKind, NoopEmitter};
use crate::provider::{Context, GenerationRequest, GenerationSource};
use crate::runtime::Scheduler;
use crate::template::cells::CellSeq;
use crate::util::constants::{DEFAULT_TEMPERATURE, ERROR_MARK, RUNNING_MARK, WAITING_MARK};

/// Lifecycle state of a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Pending,
    Running,
    Finalizing,
    Finished,
    Error,
}

impl CompletionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CompletionStatus::Finished | CompletionStatus::Error)
    }
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompletionStatus::Pending => "pending",
            CompletionStatus::Running => "running",
            CompletionStatus::Finalizing => "finalizing",
            CompletionStatus::Finished => "finished",
            CompletionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Where a completion's input context comes from at start time.
enum ContextSpec {
    /// Caller-supplied context (standalone completions).
    Direct(Context),
    /// Slice of the owning instance's cell sequence strictly before
    /// `position`, resolved when generation starts — not at node creation,
    /// since the sequence is still growing while later holes compile.
    Prefix {
        cells: Weak<CellSeq>,
        position: usize,
    },
}

struct Inner {
    status: CompletionStatus,
    buffer: FragmentBuffer,
    stops: SmallVec<[StopCondition; 2]>,
    context: Option<ContextSpec>,
    result: Option<String>,
    failure: Option<FailureInfo>,
    callbacks: Vec<Callback>,
}

/// One streaming generation task with future-like synchronization.
pub struct Completion {
    id: Uuid,
    name: Option<String>,
    include_stops: bool,
    model: String,
    temperature: f64,
    source: Arc<dyn GenerationSource>,
    scheduler: Arc<Scheduler>,
    emitter: Arc<dyn EventEmitter>,
    cancel: CancellationToken,
    inner: Mutex<Inner>,
    cv: Condvar,
}

impl Completion {
    pub fn builder() -> CompletionBuilder {
        CompletionBuilder::default()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Hole name when this completion belongs to a template.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }

    /// Non-blocking status read.
    pub fn status(&self) -> CompletionStatus {
        self.inner.lock().status
    }

    /// Non-blocking terminal check.
    pub fn done(&self) -> bool {
        self.status().is_terminal()
    }

    /// Current partial text (whatever the buffer holds right now).
    pub fn partial_text(&self) -> String {
        self.inner.lock().buffer.text().to_string()
    }

    /// Stop patterns registered so far, in registration order.
    pub fn stops(&self) -> Vec<String> {
        self.inner
            .lock()
            .stops
            .iter()
            .map(StopCondition::describe)
            .collect()
    }

    /// Register an additional stop condition. Only valid before start().
    pub fn add_stop(&self, stop: StopCondition) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.status != CompletionStatus::Pending {
            return Err(WeftError::AlreadyStarted {
                status: inner.status.to_string(),
            });
        }
        inner.stops.push(stop);
        Ok(())
    }

    /// Supply a direct context. Only valid before start().
    pub fn set_context(&self, context: impl Into<Context>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.status != CompletionStatus::Pending {
            return Err(WeftError::AlreadyStarted {
                status: inner.status.to_string(),
            });
        }
        inner.context = Some(ContextSpec::Direct(context.into()));
        Ok(())
    }

    /// Wire this completion to its position in a frozen cell sequence.
    pub(crate) fn set_prefix_context(&self, cells: &Arc<CellSeq>, position: usize) {
        let mut inner = self.inner.lock();
        debug_assert_eq!(inner.status, CompletionStatus::Pending);
        inner.context = Some(ContextSpec::Prefix {
            cells: Arc::downgrade(cells),
            position,
        });
    }

    /// Start the generation task.
    ///
    /// Resolves the effective context, transitions to `Running`, and
    /// schedules fragment consumption on the shared scheduler. Returns
    /// without blocking. Fails synchronously when no context is set or the
    /// context cannot be assembled; such failures also drive the node to
    /// `Error` so chain observers wake up.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let spec = {
            let mut inner = self.inner.lock();
            if inner.status != CompletionStatus::Pending {
                return Err(WeftError::AlreadyStarted {
                    status: inner.status.to_string(),
                });
            }
            let spec = match inner.context.take() {
                Some(spec) => spec,
                None => return Err(WeftError::MissingContext),
            };
            inner.status = CompletionStatus::Running;
            spec
        };

        if self.cancel.is_cancelled() {
            self.fail_with(FailureInfo::cancelled());
            return Err(WeftError::Cancelled);
        }

        let normalized = match self.resolve_context(spec) {
            Ok(n) => n,
            Err(err) => {
                self.fail_with(FailureInfo::start(err.to_string()));
                return Err(err);
            }
        };

        let request = GenerationRequest {
            context: normalized,
            model: self.model.clone(),
            temperature: self.temperature,
        };

        self.emitter.emit(EventKind::CompletionStarted {
            completion: self.id.to_string(),
            name: self.name.clone(),
            model: self.model.clone(),
        });
        debug!(completion = %self.label(), model = %self.model, "completion started");

        let this = Arc::clone(self);
        self.scheduler.schedule(async move {
            this.consume(request).await;
        });
        Ok(())
    }

    fn resolve_context(&self, spec: ContextSpec) -> Result<crate::provider::NormalizedContext> {
        match spec {
            ContextSpec::Direct(context) => Ok(context.normalize()),
            ContextSpec::Prefix { cells, position } => {
                let cells = cells.upgrade().ok_or(WeftError::ContextDropped)?;
                let text = cells.render_finished_prefix(position, self)?;
                Ok(crate::provider::NormalizedContext::Text(text))
            }
        }
    }

    /// Cancel this completion's generation.
    ///
    /// A node that already reached a terminal state is unaffected; a
    /// pending or in-flight node lands in `Error` with a cancellation
    /// failure, and its continuations still fire.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    async fn consume(self: Arc<Self>, request: GenerationRequest) {
        match self.consume_inner(request).await {
            Ok(()) => self.finalize(),
            Err(info) => self.fail_with(info),
        }
    }

    async fn consume_inner(&self, request: GenerationRequest) -> std::result::Result<(), FailureInfo> {
        let mut stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(FailureInfo::cancelled()),
            opened = self.source.stream(request) => {
                opened.map_err(|e| FailureInfo::source(format!("{e:#}")))?
            }
        };

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FailureInfo::cancelled()),
                next = stream.next() => match next {
                    Some(Ok(fragment)) => {
                        if self.push_fragment(fragment) {
                            // Stop matched: dropping the stream below closes
                            // the upstream source without consuming the rest.
                            break;
                        }
                    }
                    Some(Err(e)) => return Err(FailureInfo::source(format!("{e:#}"))),
                    None => break,
                }
            }
        }
        Ok(())
    }

    /// Append one fragment and evaluate stop conditions.
    ///
    /// Returns true when a stop fired (the buffer is already trimmed and
    /// the status moved to `Finalizing`).
    fn push_fragment(&self, fragment: String) -> bool {
        let mut inner = self.inner.lock();
        if inner.status != CompletionStatus::Running {
            // Cancelled or failed concurrently; drop the fragment.
            return true;
        }
        let chars = fragment.chars().count();
        inner.buffer.push(fragment);
        self.emitter.emit(EventKind::FragmentReceived {
            completion: self.id.to_string(),
            chars,
        });

        let matched = first_match(&inner.stops, inner.buffer.text());
        if let Some(m) = matched {
            let keep = if self.include_stops { m.end } else { m.start };
            inner.buffer.truncate_to(keep);
            inner.status = CompletionStatus::Finalizing;
            let pattern = inner.stops[m.index].describe();
            self.emitter.emit(EventKind::StopMatched {
                completion: self.id.to_string(),
                pattern,
                offset: m.start,
            });
            self.cv.notify_all();
            return true;
        }
        self.cv.notify_all();
        false
    }

    /// Freeze the buffer, publish the one-shot result, fire callbacks.
    fn finalize(&self) {
        let (text_len, callbacks) = {
            let mut inner = self.inner.lock();
            if inner.status.is_terminal() {
                return;
            }
            inner.status = CompletionStatus::Finalizing;
            let text = inner.buffer.text().to_string();
            let text_len = text.chars().count();
            inner.result = Some(text);
            inner.status = CompletionStatus::Finished;
            (text_len, std::mem::take(&mut inner.callbacks))
        };
        self.emitter.emit(EventKind::CompletionFinished {
            completion: self.id.to_string(),
            chars: text_len,
        });
        debug!(completion = %self.label(), chars = text_len, "completion finished");
        self.cv.notify_all();
        self.run_callbacks(callbacks);
    }

    /// Record the one-shot failure, fire callbacks (they still run so a
    /// chain can observe the failure), wake all waiters.
    fn fail_with(&self, info: FailureInfo) {
        let callbacks = {
            let mut inner = self.inner.lock();
            if inner.status.is_terminal() {
                return;
            }
            inner.failure = Some(info.clone());
            inner.status = CompletionStatus::Error;
            std::mem::take(&mut inner.callbacks)
        };
        self.emitter.emit(EventKind::CompletionFailed {
            completion: self.id.to_string(),
            error: info.message.clone(),
        });
        warn!(completion = %self.label(), error = %info.message, "completion failed");
        self.cv.notify_all();
        self.run_callbacks(callbacks);
    }

    fn run_callbacks(&self, callbacks: Vec<Callback>) {
        for callback in callbacks {
            // A panicking callback is a caller bug; surface it without
            // corrupting delivery of the remaining callbacks.
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(callback)) {
                error!(completion = %self.label(), ?panic, "done-callback panicked");
            }
        }
    }

    /// Block until the one-shot signal fires or `timeout` elapses.
    ///
    /// Returns the joined buffer text on `Finished`, re-raises the stored
    /// failure on `Error`, raises [`WeftError::ResultTimeout`] on expiry
    /// (which does not alter the node's state).
    pub fn result(&self, timeout: Option<Duration>) -> Result<String> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock();
        loop {
            match inner.status {
                CompletionStatus::Finished => {
                    return Ok(inner.result.clone().unwrap_or_default());
                }
                CompletionStatus::Error => {
                    let failure = inner.failure.clone();
                    return Err(failure
                        .map(|f| f.to_error())
                        .unwrap_or(WeftError::Generation {
                            message: "unknown failure".to_string(),
                        }));
                }
                _ => {}
            }
            match deadline {
                Some(d) => {
                    if Instant::now() >= d {
                        return Err(WeftError::ResultTimeout {
                            waited: timeout.unwrap_or_default(),
                        });
                    }
                    self.cv.wait_until(&mut inner, d);
                }
                None => self.cv.wait(&mut inner),
            }
        }
    }

    /// Block until terminal; returns the terminal status without raising
    /// the stored failure. Used to await a whole chain.
    pub fn wait_done(&self, timeout: Option<Duration>) -> Result<CompletionStatus> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock();
        loop {
            if inner.status.is_terminal() {
                return Ok(inner.status);
            }
            match deadline {
                Some(d) => {
                    if Instant::now() >= d {
                        return Err(WeftError::ResultTimeout {
                            waited: timeout.unwrap_or_default(),
                        });
                    }
                    self.cv.wait_until(&mut inner, d);
                }
                None => self.cv.wait(&mut inner),
            }
        }
    }

    /// Register a continuation to run exactly once when this completion
    /// reaches `Finished` or `Error`. If already terminal, the callback is
    /// invoked immediately, synchronously with this call.
    pub fn add_done_callback(&self, callback: impl FnOnce() + Send + 'static) {
        let run_now = {
            let mut inner = self.inner.lock();
            if inner.status.is_terminal() {
                true
            } else {
                inner.callbacks.push(Box::new(callback));
                return;
            }
        };
        if run_now {
            callback();
        }
    }

    /// Non-blocking read of the finished text.
    ///
    /// Used when assembling a successor's input context: the chain
    /// guarantees every predecessor is terminal by then.
    pub(crate) fn finished_text(&self) -> Result<String> {
        let inner = self.inner.lock();
        match inner.status {
            CompletionStatus::Finished => Ok(inner.result.clone().unwrap_or_default()),
            CompletionStatus::Error => Err(inner
                .failure
                .clone()
                .map(|f| f.to_error())
                .unwrap_or(WeftError::Generation {
                    message: "unknown failure".to_string(),
                })),
            status => Err(WeftError::NotFinished {
                name: self.label(),
                status: status.to_string(),
            }),
        }
    }

    /// Rendered view for progress display: a fixed placeholder while
    /// waiting or in flight, the accumulated text once finished.
    pub fn visual(&self) -> String {
        let inner = self.inner.lock();
        match inner.status {
            CompletionStatus::Pending => WAITING_MARK.to_string(),
            CompletionStatus::Running | CompletionStatus::Finalizing => RUNNING_MARK.to_string(),
            CompletionStatus::Finished => inner.result.clone().unwrap_or_default(),
            CompletionStatus::Error => ERROR_MARK.to_string(),
        }
    }

    /// Lazy, non-restartable view of fragments as they arrive.
    ///
    /// The iterator suspends on the completion's condvar between fragments
    /// (event-driven wake, no busy-spinning) and ends once the completion
    /// is terminal and all fragments have been yielded.
    pub fn fragments(self: &Arc<Self>) -> FragmentIter {
        FragmentIter {
            completion: Arc::clone(self),
            index: 0,
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Blocking iterator over a completion's fragments; see
/// [`Completion::fragments`].
pub struct FragmentIter {
    completion: Arc<Completion>,
    index: usize,
}

impl Iterator for FragmentIter {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let completion = Arc::clone(&self.completion);
        let mut inner = completion.inner.lock();
        loop {
            if let Some(fragment) = inner.buffer.fragment(self.index) {
                self.index += 1;
                return Some(fragment.to_string());
            }
            if inner.status.is_terminal() {
                return None;
            }
            self.completion.cv.wait(&mut inner);
        }
    }
}

/// Builder for standalone completions (template holes are built by the
/// graph compiler).
#[derive(Default)]
pub struct CompletionBuilder {
    name: Option<String>,
    context: Option<Context>,
    stops: SmallVec<[StopCondition; 2]>,
    include_stops: bool,
    model: Option<String>,
    temperature: Option<f64>,
    source: Option<Arc<dyn GenerationSource>>,
    scheduler: Option<Arc<Scheduler>>,
    emitter: Option<Arc<dyn EventEmitter>>,
}

impl CompletionBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn context(mut self, context: impl Into<Context>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn stop_literal(mut self, pattern: impl Into<String>) -> Self {
        self.stops.push(StopCondition::literal(pattern));
        self
    }

    pub fn stop_regex(mut self, pattern: &str) -> Result<Self> {
        let stop = StopCondition::regex(pattern).map_err(|e| WeftError::InvalidStopPattern {
            name: self.name.clone().unwrap_or_default(),
            pattern: pattern.to_string(),
            details: e.to_string(),
        })?;
        self.stops.push(stop);
        Ok(self)
    }

    pub fn include_stops(mut self, include: bool) -> Self {
        self.include_stops = include;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn source(mut self, source: Arc<dyn GenerationSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Build the completion without starting it.
    pub fn build(self) -> Result<Arc<Completion>> {
        let source = self.source.ok_or(WeftError::MissingSource)?;
        let model = self
            .model
            .unwrap_or_else(|| source.default_model().to_string());
        Ok(Arc::new(Completion {
            id: Uuid::new_v4(),
            name: self.name,
            include_stops: self.include_stops,
            model,
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            source,
            scheduler: self.scheduler.unwrap_or_else(Scheduler::shared),
            emitter: self.emitter.unwrap_or_else(|| Arc::new(NoopEmitter)),
            cancel: CancellationToken::new(),
            inner: Mutex::new(Inner {
                status: CompletionStatus::Pending,
                buffer: FragmentBuffer::new(),
                stops: self.stops,
                context: self.context.map(ContextSpec::Direct),
                result: None,
                failure: None,
                callbacks: Vec::new(),
            }),
            cv: Condvar::new(),
        }))
    }

    /// Build and start in one step.
    pub fn spawn(self) -> Result<Arc<Completion>> {
        let completion = self.build()?;
        completion.start()?;
        Ok(completion)
    }
}
