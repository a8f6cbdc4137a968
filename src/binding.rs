//! Bindings - argument values for template instantiation
//!
//! A binding maps a parameter name to a JSON value, an already-running
//! external completion, or a nested template instance. Dotted variable
//! paths (`{obj.field.0}`) traverse JSON objects/arrays; a name bound to a
//! completion or instance resolves through its blocking final-text
//! accessor during compilation.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::completion::Completion;
use crate::error::{Result, WeftError};
use crate::prompt::PromptInstance;

/// Valid symbol names: identifiers, same shape holes use
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Validate a hole/variable identifier.
pub fn validate_name(name: &str) -> Result<()> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(WeftError::InvalidName {
            name: name.to_string(),
        })
    }
}

/// A value bound to a template parameter.
#[derive(Clone)]
pub enum BoundValue {
    Json(Value),
    Completion(Arc<Completion>),
    Instance(Arc<PromptInstance>),
}

impl std::fmt::Debug for BoundValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundValue::Json(v) => f.debug_tuple("Json").field(v).finish(),
            BoundValue::Completion(c) => f.debug_tuple("Completion").field(&c.id()).finish(),
            BoundValue::Instance(_) => f.debug_tuple("Instance").finish(),
        }
    }
}

impl From<Value> for BoundValue {
    fn from(value: Value) -> Self {
        BoundValue::Json(value)
    }
}

impl From<&str> for BoundValue {
    fn from(value: &str) -> Self {
        BoundValue::Json(Value::String(value.to_string()))
    }
}

impl From<String> for BoundValue {
    fn from(value: String) -> Self {
        BoundValue::Json(Value::String(value))
    }
}

impl From<i64> for BoundValue {
    fn from(value: i64) -> Self {
        BoundValue::Json(Value::from(value))
    }
}

impl From<f64> for BoundValue {
    fn from(value: f64) -> Self {
        BoundValue::Json(Value::from(value))
    }
}

impl From<bool> for BoundValue {
    fn from(value: bool) -> Self {
        BoundValue::Json(Value::Bool(value))
    }
}

impl From<Arc<Completion>> for BoundValue {
    fn from(completion: Arc<Completion>) -> Self {
        BoundValue::Completion(completion)
    }
}

impl From<Arc<PromptInstance>> for BoundValue {
    fn from(instance: Arc<PromptInstance>) -> Self {
        BoundValue::Instance(instance)
    }
}

/// Name → value map handed to [`crate::prompt::PromptTemplate::instantiate`].
#[derive(Clone, Debug, Default)]
pub struct Bindings {
    values: FxHashMap<String, BoundValue>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style bind.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<BoundValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<BoundValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&BoundValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BoundValue)> {
        self.values.iter()
    }
}
