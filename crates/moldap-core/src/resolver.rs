//! Expression resolution
//!
//! Evaluates parsed [`Expression`]s against a [`ResolutionContext`]. Missing
//! context entries and missing nested attributes resolve to null rather than
//! failing; sparse source records are expected, and templates that care use
//! an `or` fallback. A template consisting of exactly one region keeps the
//! region's value as-is, so lists and numbers survive resolution without
//! being stringified.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::expr::{Expr, Expression, Segment};
use crate::filters;

/// Named read-only inputs for one resolution pass: the source record plus
/// any injected auxiliary objects.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    entries: BTreeMap<String, Value>,
}

impl ResolutionContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any previous value under the same name.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.entries.insert(name.into(), value);
        self
    }

    /// Insert an entry in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.entries.insert(name.into(), value);
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }
}

impl Expression {
    /// Evaluate this expression against a context.
    ///
    /// A single-region template yields the region's value unchanged;
    /// otherwise all segments are rendered to text and concatenated, with
    /// null rendering as the empty string.
    pub fn resolve(&self, context: &ResolutionContext) -> Result<Value> {
        if let [Segment::Region(expr)] = self.segments.as_slice() {
            return eval(expr, context);
        }
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Region(expr) => out.push_str(&render(&eval(expr, context)?)),
            }
        }
        Ok(Value::String(out))
    }
}

fn eval(expr: &Expr, context: &ResolutionContext) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(path) => Ok(walk_path(path, context)),
        Expr::Or(lhs, rhs) => {
            let value = eval(lhs, context)?;
            if is_truthy(&value) {
                Ok(value)
            } else {
                eval(rhs, context)
            }
        }
        Expr::Apply { name, args, kwargs } => {
            // Names are checked against the registry at parse time, so the
            // miss arm only guards against a registry edit between releases.
            let helper = filters::lookup(name).ok_or_else(|| Error::Expression {
                expression: name.clone(),
                message: format!("unknown filter or function '{name}'"),
            })?;
            let args = args
                .iter()
                .map(|arg| eval(arg, context))
                .collect::<Result<Vec<_>>>()?;
            let kwargs = kwargs
                .iter()
                .map(|(name, arg)| Ok((name.clone(), eval(arg, context)?)))
                .collect::<Result<Vec<_>>>()?;
            helper(&args, &kwargs)
        }
    }
}

/// Attribute access degrades to null on every missing step: unknown context
/// entry, absent object key, or indexing into a scalar.
fn walk_path(path: &[String], context: &ResolutionContext) -> Value {
    let mut current = match path.first().and_then(|name| context.get(name)) {
        Some(value) => value.clone(),
        None => return Value::Null,
    };
    for key in &path[1..] {
        current = match current {
            Value::Object(mut map) => map.remove(key.as_str()).unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    current
}

/// Standard truthiness: null, `false`, empty strings, numeric zero and empty
/// collections are falsy, everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Render a value as template text. Null renders empty; lists and objects
/// render as compact JSON.
pub(crate) fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
