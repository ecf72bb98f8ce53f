use std::path::{Path, PathBuf};

use ocean_model::PortAppConfig;

use crate::error::ConfigError;

/// Source names where a PAC document comes from: a local file on disk, watched
/// for changes with `notify`, or a remote Port endpoint, polled on an interval.
#[derive(Clone, Debug)]
pub enum Source {
    /// Local reads the PAC from a file path.
    Local(PathBuf),
    /// Remote fetches the PAC from a Port app-config endpoint.
    Remote {
        /// Url is the full PAC endpoint URL.
        url: String,
        /// BearerToken authenticates the request, when set.
        bearer_token: Option<String>,
    },
}

#[derive(Clone, Copy, Debug)]
enum Dialect {
    Json,
    Yaml,
}

fn dialect_from_path(path: &Path) -> Result<Dialect, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(Dialect::Json),
        Some("yaml") | Some("yml") => Ok(Dialect::Yaml),
        _ => Err(ConfigError::UnknownDialect(path.display().to_string())),
    }
}

fn dialect_from_url(url: &str) -> Dialect {
    if url.ends_with(".yaml") || url.ends_with(".yml") {
        Dialect::Yaml
    } else {
        Dialect::Json
    }
}

fn parse(bytes: &[u8], dialect: Dialect) -> Result<PortAppConfig, ConfigError> {
    match dialect {
        Dialect::Json => Ok(serde_json::from_slice(bytes)?),
        Dialect::Yaml => Ok(serde_yaml::from_slice(bytes)?),
    }
}

/// Fetch_bytes retrieves the raw PAC document and the dialect to parse it with,
/// without parsing. [`crate::watch::ConfigService`] uses this directly so it can
/// compare bytes across polls before paying for a reparse.
pub(crate) async fn fetch_bytes(source: &Source) -> Result<(Vec<u8>, &'static str), ConfigError> {
    match source {
        Source::Local(path) => {
            let dialect = dialect_from_path(path)?;
            let bytes = tokio::fs::read(path).await?;
            Ok((bytes, dialect_tag(dialect)))
        }
        Source::Remote { url, bearer_token } => {
            let dialect = dialect_from_url(url);
            let mut req = reqwest::Client::new().get(url);
            if let Some(token) = bearer_token {
                req = req.bearer_auth(token);
            }
            let bytes = req.send().await?.error_for_status()?.bytes().await?;
            Ok((bytes.to_vec(), dialect_tag(dialect)))
        }
    }
}

fn dialect_tag(d: Dialect) -> &'static str {
    match d {
        Dialect::Json => "json",
        Dialect::Yaml => "yaml",
    }
}

fn dialect_from_tag(tag: &str) -> Dialect {
    match tag {
        "yaml" => Dialect::Yaml,
        _ => Dialect::Json,
    }
}

pub(crate) fn parse_tagged(bytes: &[u8], tag: &str) -> Result<PortAppConfig, ConfigError> {
    parse(bytes, dialect_from_tag(tag))
}

/// Load fetches and parses a PAC document from `source` in one step.
pub async fn load(source: &Source) -> Result<PortAppConfig, ConfigError> {
    let (bytes, tag) = fetch_bytes(source).await?;
    parse_tagged(&bytes, tag)
}
