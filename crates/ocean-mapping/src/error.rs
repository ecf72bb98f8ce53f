use ocean_expr::EvalError;

use crate::resolver::ResolverError;

/// MappingError is a per-record failure from the mapping engine. It is logged and
/// counted against the owning kind but never fails the kind itself (`spec.md` §7).
#[derive(thiserror::Error, Debug, Clone)]
pub enum MappingError {
    /// SelectorFailed indicates the `selector.query` expression itself errored
    /// (as opposed to evaluating falsy, which is a filter, not an error).
    #[error("selector query failed: {0}")]
    SelectorFailed(#[from] EvalError),
    /// ItemsToParseFailed indicates the `itemsToParse` expression errored.
    #[error("itemsToParse expression failed: {0}")]
    ItemsToParseFailed(EvalError),
    /// MissingIdentifier indicates `identifier` evaluated to null, a non-string,
    /// or an empty string.
    #[error("identifier expression produced no usable value: {0}")]
    MissingIdentifier(EvalError),
    /// MissingBlueprint indicates `blueprint` evaluated to null, a non-string, or
    /// an empty string.
    #[error("blueprint expression produced no usable value: {0}")]
    MissingBlueprint(EvalError),
    /// RequiredPropertyFailed indicates a property marked `required` failed to
    /// evaluate, failing the entire entity.
    #[error("required property {property:?} failed: {source}")]
    RequiredPropertyFailed {
        /// Property is the failing property's name.
        property: String,
        /// Source is the underlying evaluation error.
        source: EvalError,
    },
    /// InvalidRelationShape indicates a relation expression produced something
    /// other than a string, list of strings, null, or a search-identifier object.
    #[error("relation {relation:?} produced an unsupported shape")]
    InvalidRelationShape {
        /// Relation is the offending relation's name.
        relation: String,
    },
    /// RelationFailed indicates a relation expression itself errored.
    #[error("relation {relation:?} expression failed: {source}")]
    RelationFailed {
        /// Relation is the offending relation's name.
        relation: String,
        /// Source is the underlying evaluation error.
        source: EvalError,
    },
    /// SearchUnresolved indicates a strict-mode search identifier resolved to zero
    /// or more than one identifier.
    #[error("relation {relation:?} search identifier did not resolve uniquely: {source}")]
    SearchUnresolved {
        /// Relation is the offending relation's name.
        relation: String,
        /// Source describes why resolution failed.
        source: ResolverError,
    },
}
