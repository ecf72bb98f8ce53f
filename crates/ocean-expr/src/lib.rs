#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

//! Ocean_expr wraps the JQ-style mapping expression language behind an opaque
//! `compile` / `evaluate` interface, the way the rest of the Ocean runtime treats it:
//! a library the mapping engine consumes, not a thing it implements.
//!
//! A mapping author writes expressions like `.spec.databases.indexer.name` or
//! `.items[] | select(.archived == false)` in a resource config; [`Expression::compile`]
//! turns source text into a reusable [`Program`], and [`Program::evaluate`] runs it
//! against a [`serde_json::Value`] context with no I/O and no shared mutable state.

use std::sync::Arc;

use jaq_core::load::{Arena, File, Loader};
use jaq_core::{Ctx, Native, RcIter};
use jaq_json::Val;
use serde_json::Value;

mod error;
pub use error::{CompileError, EvalError};

/// Expression is the namespace for compiling mapping expression source into a
/// reusable [`Program`].
pub struct Expression;

impl Expression {
    /// Compile parses and links `src`, caching nothing itself — callers (the config
    /// loader) are expected to cache the returned [`Program`] per resource config.
    pub fn compile(src: &str) -> Result<Program, CompileError> {
        let arena = Arena::default();
        let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
        let file = File {
            code: src,
            path: (),
        };
        let modules = loader
            .load(&arena, file)
            .map_err(|errs| CompileError::new(src, format!("{errs:?}")))?;

        let funs: Vec<Native<Val>> = jaq_std::funs().chain(jaq_json::funs()).collect();
        let filter = jaq_core::Compiler::default()
            .with_funs(funs)
            .compile(modules)
            .map_err(|errs| CompileError::new(src, format!("{errs:?}")))?;

        Ok(Program {
            source: Arc::from(src),
            filter: Arc::new(filter),
        })
    }
}

/// Program is a compiled mapping expression. It is cheap to clone (an `Arc` around
/// the compiled filter) and `Send + Sync`, so the config loader can hand the same
/// program to every mapper task evaluating records for its kind.
#[derive(Clone)]
pub struct Program {
    source: Arc<str>,
    filter: Arc<jaq_core::Filter<Native<Val>>>,
}

impl Program {
    /// Source returns the original expression text, for error messages and logging.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate runs the program against `input`, returning every value it produces
    /// in order. A filter may legitimately yield zero, one, or many values (e.g. a
    /// `select` that filters the record out yields zero).
    pub fn evaluate(&self, input: &Value) -> Result<Vec<Value>, EvalError> {
        let inputs = RcIter::new(core::iter::empty());
        let ctx = Ctx::new([], &inputs);
        let val = Val::from(input.clone());

        let mut out = Vec::new();
        for result in self.filter.run((ctx, val)) {
            let val = result.map_err(|e| EvalError::new(&self.source, e.to_string()))?;
            out.push(Value::from(val));
        }
        Ok(out)
    }

    /// Evaluate_one runs the program and requires exactly one resulting value,
    /// returning an error if it produced zero or more than one. Used for fields
    /// like `identifier` that must resolve to a single scalar.
    pub fn evaluate_one(&self, input: &Value) -> Result<Value, EvalError> {
        let mut values = self.evaluate(input)?;
        match values.len() {
            1 => Ok(values.remove(0)),
            0 => Err(EvalError::new(&self.source, "expression produced no value")),
            n => Err(EvalError::new(
                &self.source,
                format!("expression produced {n} values, expected exactly one"),
            )),
        }
    }

    /// Evaluate_bool runs the program and interprets the first result the way JQ
    /// truthiness does: everything except `false` and `null` is truthy. Used for
    /// `selector.query`.
    pub fn evaluate_truthy(&self, input: &Value) -> Result<bool, EvalError> {
        let values = self.evaluate(input)?;
        Ok(values
            .first()
            .map(|v| !matches!(v, Value::Null | Value::Bool(false)))
            .unwrap_or(false))
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program").field("source", &self.source).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evaluates_field_access() {
        let program = Expression::compile(".name").expect("compiles");
        let input = json!({"name": "repo-1"});
        assert_eq!(program.evaluate_one(&input).unwrap(), json!("repo-1"));
    }

    #[test]
    fn select_can_yield_nothing() {
        let program = Expression::compile("select(.archived == false)").expect("compiles");
        let input = json!({"archived": true});
        assert_eq!(program.evaluate(&input).unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn explode_yields_many() {
        let program = Expression::compile(".items[]").expect("compiles");
        let input = json!({"items": [1, 2, 3]});
        assert_eq!(program.evaluate(&input).unwrap(), vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn truthy_treats_null_and_false_as_falsy() {
        let program = Expression::compile(".flag").expect("compiles");
        assert!(!program.evaluate_truthy(&json!({})).unwrap());
        assert!(!program.evaluate_truthy(&json!({"flag": false})).unwrap());
        assert!(program.evaluate_truthy(&json!({"flag": true})).unwrap());
    }

    #[test]
    fn compile_error_on_malformed_source() {
        assert!(Expression::compile(".[").is_err());
    }
}
