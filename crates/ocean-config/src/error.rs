/// ConfigError is a failure loading or parsing a PAC document. Per-resource
/// compile failures are not represented here; they are soft failures recorded in
/// [`crate::CompiledPac::disabled`] instead.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Io indicates the local PAC file could not be read.
    #[error("reading PAC file: {0}")]
    Io(#[from] std::io::Error),
    /// Http indicates the remote PAC endpoint could not be reached.
    #[error("fetching PAC: {0}")]
    Http(#[from] reqwest::Error),
    /// Json indicates the PAC document was not valid JSON.
    #[error("parsing PAC as JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Yaml indicates the PAC document was not valid YAML.
    #[error("parsing PAC as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// UnknownDialect indicates a local path had no recognizable `.json`/`.yaml`
    /// extension, so the dialect could not be inferred.
    #[error("cannot infer config dialect for {0:?}: expected a .json or .yaml/.yml extension")]
    UnknownDialect(String),
    /// Watch indicates the filesystem watcher for a local PAC source failed to
    /// start.
    #[error("watching PAC file: {0}")]
    Watch(#[from] notify::Error),
}
