//! Weft Error Types with Error Codes
//!
//! Error code ranges:
//! - WEFT-001-019: Template/compile errors
//! - WEFT-020-029: Start/chain errors
//! - WEFT-030-039: Generation errors
//! - WEFT-040-049: Synchronization errors
//! - WEFT-050-059: Configuration/runtime setup errors

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WeftError>;

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for fancy terminal error display.
#[derive(Error, Debug, Diagnostic)]
#[diagnostic(url(docsrs))]
pub enum WeftError {
    // ═══════════════════════════════════════════
    // TEMPLATE / COMPILE ERRORS (001-019)
    // ═══════════════════════════════════════════
    #[error("[WEFT-001] Empty variable name in segment {index}")]
    #[diagnostic(
        code(weft::empty_variable),
        help("Write {{name}} with a non-empty identifier, or escape the braces: \\{{\\}}")
    )]
    EmptyVariableName { index: usize },

    #[error("[WEFT-002] Empty hole name in segment {index}")]
    #[diagnostic(
        code(weft::empty_hole),
        help("Write [name] with a non-empty identifier, or escape the brackets: \\[\\]")
    )]
    EmptyHoleName { index: usize },

    #[error("[WEFT-003] Invalid symbol name `{name}`")]
    #[diagnostic(
        code(weft::invalid_name),
        help("Names must match [A-Za-z_][A-Za-z0-9_]*")
    )]
    InvalidName { name: String },

    #[error("[WEFT-004] Undeclared symbol `{name}`")]
    #[diagnostic(
        code(weft::undeclared_symbol),
        help("Bind the name as an argument or declare it as a hole earlier in the template")
    )]
    UndeclaredSymbol { name: String },

    #[error("[WEFT-005] Hole `{name}` already declared")]
    #[diagnostic(
        code(weft::redeclared_hole),
        help("Each hole name may appear once; reference the first occurrence with {{name}}")
    )]
    RedeclaredHole { name: String },

    #[error("[WEFT-006] Hole `{name}` collides with a bound variable")]
    #[diagnostic(
        code(weft::hole_shadows_variable),
        help("Choose a different name for the hole")
    )]
    HoleShadowsVariable { name: String },

    #[error("[WEFT-007] Invalid stop pattern `{pattern}` on hole `{name}`: {details}")]
    #[diagnostic(
        code(weft::invalid_stop_pattern),
        help("The text after `:` in [name:pattern] must be a valid regular expression")
    )]
    InvalidStopPattern {
        name: String,
        pattern: String,
        details: String,
    },

    #[error("[WEFT-008] Path `{path}` not found")]
    #[diagnostic(
        code(weft::path_not_found),
        help("Check the field/index names against the bound value")
    )]
    PathNotFound { path: String },

    #[error("[WEFT-009] Cannot traverse `{segment}` into a {value_type} (path `{path}`)")]
    #[diagnostic(
        code(weft::invalid_traversal),
        help("Only objects and arrays support nested access")
    )]
    InvalidTraversal {
        segment: String,
        value_type: String,
        path: String,
    },

    #[error("[WEFT-010] Null value at `{path}`")]
    #[diagnostic(
        code(weft::null_value),
        help("Bind a concrete value; null cannot be rendered into a template")
    )]
    NullValue { path: String },

    #[error("[WEFT-011] Resolving upstream value `{name}` failed: {details}")]
    #[diagnostic(
        code(weft::upstream_resolve),
        help("The referenced completion/instance did not finish within the resolve guard; check for cross-referencing cycles between bound objects")
    )]
    UpstreamResolve { name: String, details: String },

    // ═══════════════════════════════════════════
    // START / CHAIN ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[WEFT-020] Completion has no context to start from")]
    #[diagnostic(
        code(weft::missing_context),
        help("Set a context on the builder or compile the completion into a template")
    )]
    MissingContext,

    #[error("[WEFT-021] Completion already started (status: {status})")]
    #[diagnostic(code(weft::already_started), help("start() may be called once"))]
    AlreadyStarted { status: String },

    #[error("[WEFT-022] Context cells dropped before start")]
    #[diagnostic(
        code(weft::context_dropped),
        help("Keep the template instance alive while its chain is running")
    )]
    ContextDropped,

    #[error("[WEFT-023] Predecessor `{name}` failed: {details}")]
    #[diagnostic(
        code(weft::predecessor_failed),
        help("Inspect the named completion's error via result()")
    )]
    PredecessorFailed { name: String, details: String },

    #[error("[WEFT-024] Completion `{name}` read before it finished (status: {status})")]
    #[diagnostic(
        code(weft::not_finished),
        help("Wait for the completion with result() before reading its text")
    )]
    NotFinished { name: String, status: String },

    #[error("[WEFT-025] Completion builder is missing a generation source")]
    #[diagnostic(
        code(weft::missing_source),
        help("Call .source(..) on the builder, or build through an Engine")
    )]
    MissingSource,

    // ═══════════════════════════════════════════
    // GENERATION ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[WEFT-030] Generation failed: {message}")]
    #[diagnostic(
        code(weft::generation_failed),
        help("The generation source reported an error; see the message for details")
    )]
    Generation { message: String },

    #[error("[WEFT-031] Generation cancelled")]
    #[diagnostic(code(weft::cancelled))]
    Cancelled,

    // ═══════════════════════════════════════════
    // SYNCHRONIZATION ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[WEFT-040] Timed out after {waited:?} waiting for completion")]
    #[diagnostic(
        code(weft::result_timeout),
        help("The completion is still in flight; retry with a longer timeout")
    )]
    ResultTimeout { waited: Duration },

    // ═══════════════════════════════════════════
    // CONFIGURATION / SETUP ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[WEFT-050] Config error: {reason}")]
    #[diagnostic(
        code(weft::config_error),
        help("Check ~/.config/weft/config.toml for syntax errors")
    )]
    Config { reason: String },

    #[error("[WEFT-051] No API key configured")]
    #[diagnostic(
        code(weft::missing_api_key),
        help("Set OPENAI_API_KEY or add api.openai_api_key to ~/.config/weft/config.toml")
    )]
    MissingApiKey,

    #[error("[WEFT-052] Failed to start background scheduler: {details}")]
    #[diagnostic(code(weft::scheduler_init))]
    SchedulerInit { details: String },
}

/// Classification of a captured completion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The generation source raised an error mid-stream.
    Source,
    /// The completion was cancelled while in flight.
    Cancelled,
    /// start() could not assemble a valid request.
    Start,
    /// An upstream hole in the chain failed before this one could start.
    Predecessor,
}

/// The one-shot failure record stored inside a completion.
///
/// Captured exactly once when a completion transitions to `Error`, then
/// re-raised (as a fresh [`WeftError`]) to every current and future caller
/// of `result()`.
#[derive(Debug, Clone)]
pub struct FailureInfo {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureInfo {
    pub fn source(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Source,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: "cancelled".to_string(),
        }
    }

    pub fn start(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Start,
            message: message.into(),
        }
    }

    pub fn predecessor(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Predecessor,
            message: format!("{}: {}", name.into(), message.into()),
        }
    }

    /// Re-raise this stored failure as a [`WeftError`].
    pub fn to_error(&self) -> WeftError {
        match self.kind {
            FailureKind::Cancelled => WeftError::Cancelled,
            _ => WeftError::Generation {
                message: self.message.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_codes() {
        let err = WeftError::UndeclaredSymbol {
            name: "animal".to_string(),
        };
        assert!(err.to_string().contains("WEFT-004"));
        assert!(err.to_string().contains("animal"));
    }

    #[test]
    fn failure_info_reraises_by_kind() {
        let cancelled = FailureInfo::cancelled();
        assert!(matches!(cancelled.to_error(), WeftError::Cancelled));

        let source = FailureInfo::source("connection reset");
        match source.to_error() {
            WeftError::Generation { message } => assert!(message.contains("connection reset")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn predecessor_failure_names_the_upstream_hole() {
        let info = FailureInfo::predecessor("title", "boom");
        assert!(info.message.contains("title"));
        assert!(info.message.contains("boom"));
    }
}
