/// Error aggregates every failure the core can raise outside the per-record,
/// per-item failures that stay local to a [`crate::pipeline::KindPipeline`]'s
/// run state (`spec.md` §7 distinguishes those as non-fatal).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Config indicates the PAC failed to load or compile at startup; fatal.
    #[error("config error: {0}")]
    Config(#[from] ocean_config::ConfigError),
    /// PortClient indicates the Port client failed in a way that aborts the
    /// run outright (auth rejected, or unreachable at startup).
    #[error("port client error: {0}")]
    PortClient(#[from] ocean_port_client::PortClientError),
    /// Fetcher wraps a user-supplied fetcher's error. Fails only the owning
    /// kind; other kinds continue (`spec.md` §7, `FetcherError`).
    #[error("fetcher error: {0}")]
    Fetcher(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// Webhook indicates the webhook HTTP server itself failed to start or
    /// run, as opposed to a single processor rejecting a delivery.
    #[error("webhook server error: {0}")]
    Webhook(#[from] std::io::Error),
    /// Json indicates a JSON (de)serialization failure outside the mapping
    /// engine's own typed errors.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result typedef used across `ocean-core`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// FetcherError is the error kind a user-supplied [`crate::pipeline::Fetcher`]
/// raises. It escalates to failing only its kind (`spec.md` §4.C5).
pub type FetcherError = Box<dyn std::error::Error + Send + Sync>;
