use async_trait::async_trait;
use ocean_model::SearchIdentifier;

/// ResolverError describes why a strict-mode search identifier could not be
/// resolved to exactly one target identifier.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ResolverError {
    /// NoMatch means the search returned zero identifiers.
    #[error("search matched no entities")]
    NoMatch,
    /// Ambiguous means the search returned more than one identifier.
    #[error("search matched {0} entities, expected exactly one")]
    Ambiguous(usize),
    /// Backend wraps a failure from the underlying search call (e.g. the port
    /// client's HTTP call failed outright).
    #[error("search call failed: {0}")]
    Backend(String),
}

/// SearchResolver resolves a [`SearchIdentifier`] to a target entity identifier in
/// strict mode. It is implemented by `ocean-port-client` over `POST
/// /entities/search`; the mapping engine only depends on the trait so it stays a
/// library with no knowledge of HTTP.
#[async_trait]
pub trait SearchResolver: Send + Sync {
    /// Resolve returns every target identifier the search identifier matched.
    async fn resolve(&self, search: &SearchIdentifier) -> Result<Vec<String>, ResolverError>;
}

/// PermissiveResolver never actually calls out: permissive-mode search
/// identifiers are passed through as-is for the remote catalog to interpret, so
/// this resolver is only reachable if a caller mistakenly invokes strict-mode
/// resolution while configured for permissive mode. It always reports a failure
/// so that mistake is visible rather than silently accepted.
#[derive(Clone, Copy, Debug, Default)]
pub struct PermissiveResolver;

#[async_trait]
impl SearchResolver for PermissiveResolver {
    async fn resolve(&self, _search: &SearchIdentifier) -> Result<Vec<String>, ResolverError> {
        Err(ResolverError::Backend(
            "permissive resolver does not resolve search identifiers".into(),
        ))
    }
}
