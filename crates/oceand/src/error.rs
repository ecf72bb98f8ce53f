/// Error aggregates every failure that can abort `oceand` before or during a
/// run. `anyhow::Error` catches anything below this that doesn't warrant its
/// own variant, mirroring the teacher's `Error::Other(#[from] anyhow::Error)`
/// catch-all.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Settings indicates the layered settings (CLI/env/file) failed to load
    /// or did not satisfy a required field.
    #[error("loading settings: {0}")]
    Settings(#[from] config::ConfigError),
    /// Config indicates the PAC itself failed to load or compile.
    #[error(transparent)]
    Config(#[from] ocean_config::ConfigError),
    /// Core indicates the orchestrator, pipeline or webhook surface failed.
    #[error(transparent)]
    Core(#[from] ocean_core::Error),
    /// AddrParse indicates a configured bind address was not a valid socket
    /// address.
    #[error("parsing bind address: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    /// Io covers filesystem and network setup failures outside the above.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Tracing indicates the global tracing subscriber could not be
    /// installed, which only happens if `oceand` mistakenly tries twice.
    #[error("installing tracing subscriber: {0}")]
    Tracing(#[from] tracing::subscriber::SetGlobalDefaultError),
    /// TracingFilter indicates `RUST_LOG` (or the built-in default) could not
    /// be parsed as a tracing filter directive.
    #[error("parsing tracing filter: {0}")]
    TracingFilter(#[from] tracing_subscriber::filter::ParseError),
    /// Other catches anything else, reported at the CLI boundary only.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
