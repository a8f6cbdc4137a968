//! Graph Compiler - segments → cells, symbols, and the completion chain
//!
//! One strict left-to-right pass over the segment sequence:
//!
//! - literals append verbatim;
//! - variables resolve against the symbol table (bound arguments, dotted
//!   JSON paths, blocking resolution of external completions/instances, or
//!   a live node cell for an earlier hole of the same template);
//! - holes create a new completion at its own cell position, wire the
//!   previous hole's done-callback to start it, and may pick up an
//!   explicit `name:pattern` regex stop plus the heuristic clause-boundary
//!   auto-stop from the following literal.
//!
//! Holes therefore execute in strict declared order: hole k+1 starts only
//! once hole k reaches a terminal state.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::binding::{validate_name, Bindings, BoundValue};
use crate::completion::{Completion, StopCondition};
use crate::engine::Engine;
use crate::error::{Result, WeftError};
use crate::event::{EventEmitter, EventKind};
use crate::util::constants::{CLAUSE_BOUNDARIES, RESOLVE_GUARD};

use super::cells::{Cell, CellSeq};
use super::lexer::{Segment, SegmentKind};

/// A name in the compiled symbol table.
#[derive(Clone)]
pub enum Symbol {
    /// Caller-supplied argument
    Bound(BoundValue),
    /// A hole declared by this template
    Hole(Arc<Completion>),
}

/// Name → symbol map; built once during compilation, read-only afterwards.
#[derive(Default)]
pub struct SymbolTable {
    map: FxHashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }
}

/// Output of one compilation pass.
pub(crate) struct Compiled {
    pub cells: Arc<CellSeq>,
    pub symbols: Arc<SymbolTable>,
    /// Holes in declaration order
    pub holes: Vec<Arc<Completion>>,
    pub entrypoint: Option<String>,
    pub exitpoint: Option<String>,
}

pub(crate) fn compile(
    segments: &[Segment],
    bindings: &Bindings,
    engine: &Engine,
    emitter: Arc<dyn EventEmitter>,
) -> Result<Compiled> {
    let mut symbols = SymbolTable::default();
    for (name, value) in bindings.iter() {
        symbols
            .map
            .insert(name.clone(), Symbol::Bound(value.clone()));
    }

    let mut cells: Vec<Cell> = Vec::with_capacity(segments.len());
    let mut holes: Vec<(Arc<Completion>, usize)> = Vec::new();
    let mut prev_hole: Option<Arc<Completion>> = None;
    // Set when the segment just processed declared a hole; only the very
    // next segment, and only if it is a literal, feeds the auto-stop.
    let mut pending_auto_stop: Option<Arc<Completion>> = None;
    let mut entrypoint = None;

    for (index, segment) in segments.iter().enumerate() {
        match segment.kind {
            SegmentKind::Literal => {
                if let Some(hole) = pending_auto_stop.take() {
                    if let Some(boundary) = clause_boundary_stop(&segment.text) {
                        debug!(hole = ?hole.name(), stop = %boundary, "auto-stop registered");
                        hole.add_stop(StopCondition::literal(boundary))?;
                    }
                }
                cells.push(Cell::Literal(segment.text.clone()));
            }
            SegmentKind::Variable => {
                pending_auto_stop = None;
                cells.push(resolve_variable(&segment.text, index, &symbols)?);
            }
            SegmentKind::Hole => {
                pending_auto_stop = None;
                let (name, pattern) = match segment.text.split_once(':') {
                    Some((name, pattern)) => (name, Some(pattern)),
                    None => (segment.text.as_str(), None),
                };
                if name.is_empty() {
                    return Err(WeftError::EmptyHoleName { index });
                }
                validate_name(name)?;
                match symbols.get(name) {
                    Some(Symbol::Hole(_)) => {
                        return Err(WeftError::RedeclaredHole {
                            name: name.to_string(),
                        })
                    }
                    Some(Symbol::Bound(_)) => {
                        return Err(WeftError::HoleShadowsVariable {
                            name: name.to_string(),
                        })
                    }
                    None => {}
                }

                let completion = engine
                    .hole()
                    .name(name)
                    .emitter(Arc::clone(&emitter))
                    .build()?;
                if let Some(pattern) = pattern {
                    let stop = StopCondition::regex(pattern).map_err(|e| {
                        WeftError::InvalidStopPattern {
                            name: name.to_string(),
                            pattern: pattern.to_string(),
                            details: e.to_string(),
                        }
                    })?;
                    completion.add_stop(stop)?;
                }

                let position = cells.len();
                cells.push(Cell::Node(Arc::clone(&completion)));

                match &prev_hole {
                    Some(prev) => {
                        let next = Arc::clone(&completion);
                        let emitter = Arc::clone(&emitter);
                        let from = prev.name().unwrap_or_default().to_string();
                        let to = name.to_string();
                        prev.add_done_callback(move || {
                            emitter.emit(EventKind::ChainAdvanced {
                                from,
                                to: to.clone(),
                            });
                            if let Err(e) = next.start() {
                                warn!(hole = %to, error = %e, "chain continuation failed to start");
                            }
                        });
                    }
                    None => entrypoint = Some(name.to_string()),
                }

                symbols
                    .map
                    .insert(name.to_string(), Symbol::Hole(Arc::clone(&completion)));
                prev_hole = Some(Arc::clone(&completion));
                pending_auto_stop = Some(Arc::clone(&completion));
                holes.push((completion, position));
            }
        }
    }

    let cells = CellSeq::new(cells);
    // Snapshot positions wire up only now, against the frozen sequence.
    for (hole, position) in &holes {
        hole.set_prefix_context(&cells, *position);
    }
    let exitpoint = holes.last().and_then(|(h, _)| h.name().map(str::to_string));

    Ok(Compiled {
        cells,
        symbols: Arc::new(symbols),
        holes: holes.into_iter().map(|(h, _)| h).collect(),
        entrypoint,
        exitpoint,
    })
}

/// Resolve one `{path}` reference into a cell.
fn resolve_variable(path: &str, index: usize, symbols: &SymbolTable) -> Result<Cell> {
    let mut parts = path.split('.');
    let root = parts.next().unwrap_or_default();
    if root.is_empty() {
        return Err(WeftError::EmptyVariableName { index });
    }
    let rest: Vec<&str> = parts.collect();

    match symbols.get(root) {
        None => Err(WeftError::UndeclaredSymbol {
            name: root.to_string(),
        }),
        Some(Symbol::Hole(completion)) => {
            if let Some(segment) = rest.first() {
                return Err(WeftError::InvalidTraversal {
                    segment: (*segment).to_string(),
                    value_type: "completion".to_string(),
                    path: path.to_string(),
                });
            }
            // An earlier hole of this template: append the live node. Its
            // text flows into later contexts once the chain reaches it.
            Ok(Cell::Node(Arc::clone(completion)))
        }
        Some(Symbol::Bound(value)) => {
            let text = resolve_bound(value, &rest, path)?;
            Ok(Cell::Resolved(text))
        }
    }
}

/// Materialize a bound value (possibly through a dotted path) as text.
///
/// Completions and nested instances resolve through their blocking
/// final-text accessor, bounded by [`RESOLVE_GUARD`] so an accidental
/// cross-reference cycle fails instead of deadlocking.
fn resolve_bound(value: &BoundValue, rest: &[&str], path: &str) -> Result<String> {
    match value {
        BoundValue::Completion(completion) => {
            if let Some(segment) = rest.first() {
                return Err(WeftError::InvalidTraversal {
                    segment: (*segment).to_string(),
                    value_type: "completion".to_string(),
                    path: path.to_string(),
                });
            }
            completion
                .result(Some(RESOLVE_GUARD))
                .map_err(|e| WeftError::UpstreamResolve {
                    name: path.to_string(),
                    details: e.to_string(),
                })
        }
        BoundValue::Instance(instance) => match rest.split_first() {
            None => instance
                .wait_text(Some(RESOLVE_GUARD))
                .map_err(|e| WeftError::UpstreamResolve {
                    name: path.to_string(),
                    details: e.to_string(),
                }),
            Some((head, tail)) => match instance.symbol(head) {
                None => Err(WeftError::PathNotFound {
                    path: path.to_string(),
                }),
                Some(Symbol::Hole(completion)) => {
                    resolve_bound(&BoundValue::Completion(completion), tail, path)
                }
                Some(Symbol::Bound(inner)) => resolve_bound(&inner, tail, path),
            },
        },
        BoundValue::Json(root_value) => {
            let mut current = root_value;
            let mut traversed = String::new();
            for segment in rest {
                let next = if let Ok(idx) = segment.parse::<usize>() {
                    current.get(idx)
                } else {
                    current.get(*segment)
                };
                match next {
                    Some(v) => {
                        if !traversed.is_empty() {
                            traversed.push('.');
                        }
                        traversed.push_str(segment);
                        current = v;
                    }
                    None => {
                        return if matches!(current, Value::Object(_) | Value::Array(_)) {
                            Err(WeftError::PathNotFound {
                                path: path.to_string(),
                            })
                        } else {
                            Err(WeftError::InvalidTraversal {
                                segment: (*segment).to_string(),
                                value_type: value_type_name(current).to_string(),
                                path: path.to_string(),
                            })
                        };
                    }
                }
            }
            value_to_string(current, path)
        }
    }
}

/// Convert a JSON value to template text (strict mode: null is an error).
pub(crate) fn value_to_string(value: &Value, path: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Err(WeftError::NullValue {
            path: path.to_string(),
        }),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        // Objects/arrays render as compact JSON
        other => Ok(other.to_string()),
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The auto-stop heuristic: the maximal run of clause-boundary characters
/// leading the literal's first non-blank token, if any.
fn clause_boundary_stop(literal: &str) -> Option<String> {
    let token = literal.split_whitespace().next()?;
    let run: String = token
        .chars()
        .take_while(|c| CLAUSE_BOUNDARIES.contains(c))
        .collect();
    if run.is_empty() {
        None
    } else {
        Some(run)
    }
}
