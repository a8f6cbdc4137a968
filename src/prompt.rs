//! PromptTemplate and PromptInstance - the caller-facing surface
//!
//! A [`PromptTemplate`] is a parsed template definition; instantiating it
//! with bindings compiles the cell sequence and (by default) starts the
//! hole chain immediately, returning a [`PromptInstance`] the caller can
//! render, observe, or block on while generation proceeds in the
//! background.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::binding::{Bindings, BoundValue};
use crate::completion::{Completion, CompletionStatus};
use crate::engine::Engine;
use crate::error::{Result, WeftError};
use crate::event::EventLog;
use crate::template::cells::CellSeq;
use crate::template::compiler::{compile, value_to_string, Compiled, Symbol, SymbolTable};
use crate::template::lexer::{lex, Segment};

/// A parsed template definition. Parse once, instantiate many times.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Lex the template text. Lexing never fails; name and binding errors
    /// surface at instantiation.
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let segments = lex(&source);
        Self { source, segments }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Compile with bindings and start the chain's entrypoint immediately.
    pub fn instantiate(&self, bindings: &Bindings, engine: &Engine) -> Result<Arc<PromptInstance>> {
        let instance = self.instantiate_deferred(bindings, engine)?;
        instance.start()?;
        Ok(instance)
    }

    /// Compile with bindings without starting generation; call
    /// [`PromptInstance::start`] when ready.
    pub fn instantiate_deferred(
        &self,
        bindings: &Bindings,
        engine: &Engine,
    ) -> Result<Arc<PromptInstance>> {
        let events = EventLog::new();
        let Compiled {
            cells,
            symbols,
            holes,
            entrypoint,
            exitpoint,
        } = compile(&self.segments, bindings, engine, Arc::new(events.clone()))?;

        debug!(
            holes = holes.len(),
            entrypoint = ?entrypoint,
            "template compiled"
        );

        Ok(Arc::new(PromptInstance {
            cells,
            symbols,
            holes,
            entrypoint,
            exitpoint,
            events,
            started: AtomicBool::new(false),
        }))
    }
}

/// One invocation of a compiled template with bound arguments.
///
/// Owns the frozen cell sequence and symbol table. Holes fill in declared
/// order on the background scheduler; any thread may render or block on
/// named results concurrently.
pub struct PromptInstance {
    cells: Arc<CellSeq>,
    symbols: Arc<SymbolTable>,
    holes: Vec<Arc<Completion>>,
    entrypoint: Option<String>,
    exitpoint: Option<String>,
    events: EventLog,
    started: AtomicBool,
}

impl PromptInstance {
    /// Start the chain's entrypoint. Idempotent; later calls are no-ops.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(first) = self.holes.first() {
            first.start()?;
        }
        Ok(())
    }

    /// First hole name in source order, if any.
    pub fn entrypoint(&self) -> Option<&str> {
        self.entrypoint.as_deref()
    }

    /// Last hole name in source order, if any.
    pub fn exitpoint(&self) -> Option<&str> {
        self.exitpoint.as_deref()
    }

    /// The completions of this instance's holes, in declaration order.
    pub fn holes(&self) -> &[Arc<Completion>] {
        &self.holes
    }

    /// The frozen cell sequence.
    pub fn cells(&self) -> &Arc<CellSeq> {
        &self.cells
    }

    /// Lifecycle events recorded by this instance's completions.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Look up a name: the hole's completion node, or the bound value.
    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.symbols.get(name).cloned()
    }

    /// The completion behind `name`, whether declared as a hole here or
    /// bound externally.
    pub fn completion(&self, name: &str) -> Option<Arc<Completion>> {
        match self.symbols.get(name)? {
            Symbol::Hole(c) => Some(Arc::clone(c)),
            Symbol::Bound(BoundValue::Completion(c)) => Some(Arc::clone(c)),
            Symbol::Bound(_) => None,
        }
    }

    pub(crate) fn symbol(&self, name: &str) -> Option<Symbol> {
        self.symbols.get(name).cloned()
    }

    /// Resolve `name` to text, blocking until the underlying hole
    /// finishes. Re-raises a failed hole's stored error.
    pub fn text(&self, name: &str) -> Result<String> {
        self.text_timeout(name, None)
    }

    /// [`Self::text`] with a bound on the wait.
    pub fn text_timeout(&self, name: &str, timeout: Option<Duration>) -> Result<String> {
        match self.symbols.get(name) {
            None => Err(WeftError::UndeclaredSymbol {
                name: name.to_string(),
            }),
            Some(Symbol::Hole(completion)) => completion.result(timeout),
            Some(Symbol::Bound(BoundValue::Completion(completion))) => completion.result(timeout),
            Some(Symbol::Bound(BoundValue::Instance(instance))) => instance.wait_text(timeout),
            Some(Symbol::Bound(BoundValue::Json(value))) => value_to_string(value, name),
        }
    }

    /// Live rendering: finished content cell by cell, placeholder markers
    /// for pending/running holes. Never blocks.
    pub fn render(&self) -> String {
        self.cells.render()
    }

    /// `(n_complete, n_waiting)` over this instance's holes. Terminal
    /// states count as complete so a failed chain never reads as pending.
    pub fn progress(&self) -> (usize, usize) {
        let complete = self
            .holes
            .iter()
            .filter(|h| h.status().is_terminal())
            .count();
        (complete, self.holes.len() - complete)
    }

    /// Block until every hole is terminal, suspending between completions
    /// rather than busy-waiting. Returns the first failed hole's error if
    /// any hole landed in `Error`.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        for hole in &self.holes {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let status = hole.wait_done(remaining)?;
            if status == CompletionStatus::Error {
                if let Err(err) = hole.result(Some(Duration::ZERO)) {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Blocking whole-instance text: wait for every hole, then render.
    pub fn wait_text(&self, timeout: Option<Duration>) -> Result<String> {
        self.wait(timeout)?;
        Ok(self.render())
    }

    /// Cancel every hole still in flight. Downstream holes observe the
    /// cancellation through the chain and fail their own start.
    pub fn cancel(&self) {
        for hole in &self.holes {
            hole.cancel();
        }
    }
}

impl Drop for PromptInstance {
    fn drop(&mut self) {
        // No teardown beyond aborting whatever is still in flight.
        self.cancel();
    }
}

impl std::fmt::Display for PromptInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

impl std::fmt::Debug for PromptInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptInstance")
            .field("holes", &self.holes.len())
            .field("entrypoint", &self.entrypoint)
            .field("exitpoint", &self.exitpoint)
            .field("progress", &self.progress())
            .finish_non_exhaustive()
    }
}
