/// Error is the catch-all error type for the entity model crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Validation indicates an entity or resource config failed its field validation.
    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
    /// MissingName indicates a required string field was absent or empty.
    #[error("missing required field: {0}")]
    MissingName(&'static str),
    /// JSON indicates a JSON (de)serialization failure.
    #[error("json error: {0}")]
    JSON(#[from] serde_json::Error),
}
