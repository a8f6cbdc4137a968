//! Weft - prompt-template compiler with streaming hole completion
//!
//! A template mixes literal text, variables (`{name}`, already-known
//! values), and holes (`[name]`, values produced by a generation source).
//! Instantiating a template compiles it into an ordered cell sequence and
//! starts filling the holes, in declaration order, with concurrently
//! streamed completions — while the caller keeps working and observes or
//! blocks on any named result later.
//!
//! ```rust,no_run
//! use weft::{Bindings, Engine, PromptTemplate, WeftConfig};
//!
//! let engine = Engine::from_config(&WeftConfig::load()?)?;
//!
//! let template = PromptTemplate::parse(
//!     "One kind of {x} is a [name].\n\n5 {name}s makes a [group_name].",
//! );
//! let animal = template.instantiate(&Bindings::new().bind("x", "domestic animal"), &engine)?;
//!
//! println!("this prints immediately: {animal}");
//! println!("{}", animal.text("name")?);        // blocks until the hole fills
//! println!("{}", animal.text("group_name")?);
//! # Ok::<(), weft::WeftError>(())
//! ```
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        TEMPLATE LAYER                        │
//! │  template/  lexer, graph compiler, cell sequence             │
//! │  binding/   argument values, dotted-path resolution          │
//! │  prompt     PromptTemplate / PromptInstance façade           │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       EXECUTION LAYER                        │
//! │  completion/  streaming state machine, stops, buffer         │
//! │  runtime/     shared background scheduler                    │
//! │  engine       source + scheduler + sampling defaults         │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  provider/  generation sources (OpenAI-compatible, mock)     │
//! │  event      completion lifecycle log                         │
//! │  config     persistent configuration                         │
//! │  error      typed errors with fix suggestions                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`template`] | text → segments → cells + symbols + chain |
//! | [`binding`] | name → value map, dotted JSON traversal |
//! | [`prompt`] | the caller-facing template instance |
//! | [`completion`] | per-hole streaming state machine |
//! | [`runtime`] | single shared cooperative scheduler |
//! | [`engine`] | source/scheduler/model bundle |
//! | [`provider`] | generation source abstraction |
//! | [`event`] | sequence-numbered lifecycle events |
//! | [`config`] | `~/.config/weft/config.toml` + env overrides |
//! | [`error`] | `WeftError` with coded variants |

// ═══════════════════════════════════════════════════════════════
// TEMPLATE LAYER
// ═══════════════════════════════════════════════════════════════
pub mod binding;
pub mod prompt;
pub mod template;

// ═══════════════════════════════════════════════════════════════
// EXECUTION LAYER
// ═══════════════════════════════════════════════════════════════
pub mod completion;
pub mod engine;
pub mod runtime;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER
// ═══════════════════════════════════════════════════════════════
pub mod event;
pub mod provider;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod error;
pub mod util;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

// Error types
pub use error::{FailureInfo, FailureKind, Result, WeftError};

// Config types
pub use config::{mask_api_key, WeftConfig};

// Template layer
pub use binding::{validate_name, Bindings, BoundValue};
pub use prompt::{PromptInstance, PromptTemplate};
pub use template::{Cell, CellSeq, Segment, SegmentKind, Symbol, SymbolTable};

// Execution layer
pub use completion::{
    Completion, CompletionBuilder, CompletionStatus, FragmentIter, StopCondition,
};
pub use engine::{Engine, EngineBuilder};
pub use runtime::Scheduler;

// Infrastructure
pub use event::{Event, EventEmitter, EventKind, EventLog, NoopEmitter};
pub use provider::{
    Context, ContextPart, GenerationRequest, GenerationSource, MockSource, OpenAiSource, Role,
    Turn,
};
