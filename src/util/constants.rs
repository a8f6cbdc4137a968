//! Centralized constants for weft runtime configuration
//!
//! All timeout, marker, and heuristic values in one place for easy tuning.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════
// Timeouts
// ═══════════════════════════════════════════════════════════════

/// Timeout for establishing HTTP connections to a generation source
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall timeout for one streaming generation request
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Upper bound on blocking variable resolution during compilation.
///
/// An accidental cycle of cross-referencing bound completions surfaces as
/// an `UpstreamResolve` error after this long instead of deadlocking the
/// compiling thread.
pub const RESOLVE_GUARD: Duration = Duration::from_secs(600);

// ═══════════════════════════════════════════════════════════════
// Rendering markers
// ═══════════════════════════════════════════════════════════════

/// Placeholder rendered for a hole that has not started yet
pub const WAITING_MARK: &str = "[     ]";

/// Placeholder rendered for a hole whose generation is in flight
pub const RUNNING_MARK: &str = "[ ... ]";

/// Placeholder rendered for a hole whose generation failed
pub const ERROR_MARK: &str = "[  !  ]";

// ═══════════════════════════════════════════════════════════════
// Auto-stop heuristic
// ═══════════════════════════════════════════════════════════════

/// Clause-boundary characters that trigger the automatic stop condition on
/// the hole preceding a literal segment.
///
/// The brace/bracket entries can only occur via escapes (unescaped ones
/// would have opened a segment).
pub const CLAUSE_BOUNDARIES: &[char] = &[
    '.', ',', '?', '!', ':', ';', '(', ')', '"', '\'', '{', '}', '[', ']',
];

// ═══════════════════════════════════════════════════════════════
// Sampling defaults
// ═══════════════════════════════════════════════════════════════

/// Default sampling temperature when neither config nor builder sets one
pub const DEFAULT_TEMPERATURE: f64 = 0.9;
