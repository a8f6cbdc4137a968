//! Cell sequence - the compiled rendering units
//!
//! Compilation appends cells strictly left-to-right, then the sequence
//! freezes. Rendering the whole sequence at any time yields the template's
//! current state: pending holes render as placeholder markers. A node's
//! effective input context is the slice strictly before its own snapshot
//! position, resolved at start time (not at node creation — the sequence
//! may still be growing while later holes compile).

use std::sync::Arc;

use crate::completion::Completion;
use crate::error::{Result, WeftError};

/// One rendering unit of a compiled template.
#[derive(Clone)]
pub enum Cell {
    /// Literal template text (escapes resolved)
    Literal(String),
    /// Variable content materialized at compile time
    Resolved(String),
    /// A live completion: a hole at its declaration position, or a
    /// back-reference to an earlier hole of the same template
    Node(Arc<Completion>),
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Literal(t) => f.debug_tuple("Literal").field(t).finish(),
            Cell::Resolved(t) => f.debug_tuple("Resolved").field(t).finish(),
            Cell::Node(c) => f.debug_tuple("Node").field(&c.id()).finish(),
        }
    }
}

/// The frozen, ordered cell sequence of one template instance.
#[derive(Debug)]
pub struct CellSeq {
    cells: Vec<Cell>,
}

impl CellSeq {
    pub(crate) fn new(cells: Vec<Cell>) -> Arc<Self> {
        Arc::new(Self { cells })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cell> {
        self.cells.iter()
    }

    /// Live view: finished nodes render their text, pending/running nodes
    /// render placeholder markers. Never blocks.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for cell in &self.cells {
            match cell {
                Cell::Literal(text) | Cell::Resolved(text) => out.push_str(text),
                Cell::Node(completion) => out.push_str(&completion.visual()),
            }
        }
        out
    }

    /// The input context for the node at `position`: every cell strictly
    /// before it, with node cells resolved to their finished text.
    ///
    /// The chain guarantees every predecessor is terminal by the time a
    /// hole starts. Should `own` nevertheless appear in its own prefix (an
    /// aliasing bug), the context truncates at the first occurrence so a
    /// node never sees its own not-yet-produced output.
    pub(crate) fn render_finished_prefix(
        &self,
        position: usize,
        own: &Completion,
    ) -> Result<String> {
        let mut out = String::new();
        for cell in self.cells.iter().take(position) {
            match cell {
                Cell::Literal(text) | Cell::Resolved(text) => out.push_str(text),
                Cell::Node(completion) => {
                    if std::ptr::eq(completion.as_ref(), own) {
                        break;
                    }
                    match completion.finished_text() {
                        Ok(text) => out.push_str(&text),
                        Err(WeftError::NotFinished { name, status }) => {
                            return Err(WeftError::NotFinished { name, status })
                        }
                        Err(err) => {
                            return Err(WeftError::PredecessorFailed {
                                name: completion
                                    .name()
                                    .map(str::to_string)
                                    .unwrap_or_else(|| completion.id().to_string()),
                                details: err.to_string(),
                            })
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}
