//! JEXL expression evaluator for transform and condition steps.
//!
//! Wraps `jexl_eval::Evaluator` with a small whitelist of transforms. The
//! language covers literals, arithmetic, comparison, boolean operators,
//! ternaries and dotted/indexed property access. There is no I/O and no way
//! to call host functions beyond the registered transforms.
//!
//! Expressions see two read-only bindings built from the run:
//! - `variables` -- the run's variable bag
//! - `steps` -- step results so far, keyed by step ID
//!   (`steps.fetch.status`, `steps.fetch.data.items`)
//!
//! **Security note:** Run data is always passed as the context object, NEVER
//! interpolated into expression strings.

use serde_json::{Map, Value, json};
use stepflow_types::workflow::WorkflowRun;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during expression evaluation.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("Expression evaluation failed: {0}")]
    EvalFailed(String),

    #[error("Expression is empty")]
    EmptyExpression,

    #[error("Invalid context: {0}")]
    InvalidContext(String),
}

// ---------------------------------------------------------------------------
// WorkflowEvaluator
// ---------------------------------------------------------------------------

/// JEXL expression evaluator with the standard transforms registered.
///
/// Build one per evaluation and drop it before the next `.await`; the
/// underlying evaluator is not meant to be shared across tasks.
pub struct WorkflowEvaluator {
    evaluator: jexl_eval::Evaluator<'static>,
}

impl WorkflowEvaluator {
    /// Create a new evaluator with all standard transforms registered.
    pub fn new() -> Self {
        let evaluator = jexl_eval::Evaluator::new()
            .with_transform("lower", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_lowercase()))
            })
            .with_transform("upper", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_uppercase()))
            })
            .with_transform("trim", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.trim()))
            })
            .with_transform("not", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                Ok(json!(!Self::value_to_bool(&val)))
            })
            .with_transform("contains", |args: &[Value]| {
                let needle = args.get(1).cloned().unwrap_or(Value::Null);
                let found = match args.first() {
                    Some(Value::String(s)) => needle.as_str().is_some_and(|n| s.contains(n)),
                    Some(Value::Array(items)) => items.contains(&needle),
                    Some(Value::Object(map)) => {
                        needle.as_str().is_some_and(|key| map.contains_key(key))
                    }
                    _ => false,
                };
                Ok(json!(found))
            })
            // Length transform (works on strings, arrays, and objects)
            .with_transform("length", |args: &[Value]| {
                let len = match args.first() {
                    Some(Value::String(s)) => s.chars().count(),
                    Some(Value::Array(a)) => a.len(),
                    Some(Value::Object(o)) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            })
            .with_transform("keys", |args: &[Value]| {
                let keys: Vec<String> = match args.first() {
                    Some(Value::Object(o)) => o.keys().cloned().collect(),
                    _ => Vec::new(),
                };
                Ok(json!(keys))
            });

        Self { evaluator }
    }

    /// Evaluate an expression to a boolean result.
    ///
    /// The `context` must be a JSON object. Expression results are coerced
    /// to boolean using JavaScript-like truthiness rules.
    pub fn evaluate_bool(&self, expression: &str, context: &Value) -> Result<bool, ExpressionError> {
        let result = self.evaluate_value(expression, context)?;
        Ok(Self::value_to_bool(&result))
    }

    /// Evaluate an expression and return the raw JSON value.
    pub fn evaluate_value(&self, expression: &str, context: &Value) -> Result<Value, ExpressionError> {
        if !context.is_object() {
            return Err(ExpressionError::InvalidContext(
                "context must be a JSON object".to_string(),
            ));
        }
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(ExpressionError::EmptyExpression);
        }

        self.evaluator
            .eval_in_context(expression, context)
            .map_err(|e| ExpressionError::EvalFailed(e.to_string()))
    }

    /// Evaluate a transform body.
    ///
    /// A body is a single expression, optionally written as a return
    /// statement (`return variables.a + 1;`).
    pub fn evaluate_transform(&self, code: &str, context: &Value) -> Result<Value, ExpressionError> {
        self.evaluate_value(strip_return(code), context)
    }

    /// Evaluate a condition against a run's `variables` and `steps` bindings.
    pub fn evaluate_in_run(&self, expression: &str, run: &WorkflowRun) -> Result<bool, ExpressionError> {
        self.evaluate_bool(expression, &expression_context(run))
    }

    /// Coerce a JSON value to boolean using JavaScript-like truthiness.
    pub fn value_to_bool(value: &Value) -> bool {
        match value {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }
}

impl Default for WorkflowEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the JSON object expressions evaluate against.
///
/// Shape:
/// ```json
/// {
///   "variables": { ... },
///   "steps": { "<step_id>": { "step_id": ..., "status": ..., "data": ..., ... } }
/// }
/// ```
pub fn expression_context(run: &WorkflowRun) -> Value {
    let mut steps = Map::new();
    for result in run.step_results.iter() {
        let value = serde_json::to_value(result).unwrap_or(Value::Null);
        steps.insert(result.step_id.clone(), value);
    }

    json!({
        "variables": run.variables,
        "steps": steps,
    })
}

fn strip_return(code: &str) -> &str {
    let code = code.trim();
    let code = code.strip_suffix(';').unwrap_or(code).trim_end();
    match code.strip_prefix("return") {
        Some(rest) if rest.starts_with(char::is_whitespace) || rest.starts_with('(') => rest.trim(),
        _ => code,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
