//! Template pipeline: lexer → graph compiler → cell sequence
//!
//! | Stage | Responsibility |
//! |-------|----------------|
//! | [`lexer`] | text → literal/variable/hole segments |
//! | [`compiler`] | segments + bindings → cells, symbols, chain |
//! | [`cells`] | frozen rendering units with position-sliced prefixes |

pub mod cells;
pub mod compiler;
pub mod lexer;

pub use cells::{Cell, CellSeq};
pub use compiler::{Symbol, SymbolTable};
pub use lexer::{lex, Segment, SegmentKind};
