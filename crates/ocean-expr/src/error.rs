/// CompileError indicates an expression failed to parse or link.
#[derive(thiserror::Error, Debug, Clone)]
#[error("failed to compile expression {source:?}: {detail}")]
pub struct CompileError {
    source: String,
    detail: String,
}

impl CompileError {
    pub(crate) fn new(source: &str, detail: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            detail: detail.into(),
        }
    }
}

/// EvalError indicates a compiled program failed to evaluate against a given input.
#[derive(thiserror::Error, Debug, Clone)]
#[error("failed to evaluate expression {source:?}: {detail}")]
pub struct EvalError {
    source: String,
    detail: String,
}

impl EvalError {
    pub(crate) fn new(source: &str, detail: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            detail: detail.into(),
        }
    }

    /// Custom builds an [`EvalError`] for a caller-detected failure that is
    /// not a JQ evaluation failure itself (e.g. "expression produced the
    /// wrong shape"), so downstream consumers still get the originating
    /// source text alongside the detail.
    pub fn custom(source: &str, detail: impl Into<String>) -> Self {
        Self::new(source, detail)
    }
}
