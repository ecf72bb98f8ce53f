use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

/// Settings is `oceand`'s own layered configuration, distinct from the PAC
/// that [`ocean_config`] loads: where the PAC comes from, how to reach Port,
/// and which sockets to bind. Layered CLI flag > environment (`OCEAN_*`) >
/// settings file > default, mirroring the teacher's `config::Config` builder
/// in `controller/src/main.rs`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// PacSource is a local file path or a remote PAC endpoint URL.
    pub pac_source: String,
    /// PacPollIntervalSecs is how often a remote PAC source is re-fetched.
    #[serde(default = "default_pac_poll_interval_secs")]
    pub pac_poll_interval_secs: u64,
    /// PortBaseUrl is the Port API base URL.
    pub port_base_url: String,
    /// PortClientId authenticates the integration with Port.
    pub port_client_id: String,
    /// PortClientSecret authenticates the integration with Port.
    pub port_client_secret: String,
    /// IntegrationIdentifier scopes stale-deletion to this integration's own
    /// entities.
    pub integration_identifier: String,
    /// MetricsBindAddr serves the Prometheus `/metrics` endpoint.
    #[serde(default = "default_metrics_bind_addr")]
    pub metrics_bind_addr: String,
    /// WebhookBindAddr serves the webhook delivery HTTP surface.
    #[serde(default = "default_webhook_bind_addr")]
    pub webhook_bind_addr: String,
    /// ResolutionPolicy selects strict or permissive search-identifier
    /// resolution for this run.
    #[serde(default = "default_resolution_policy")]
    pub resolution_policy: String,
    /// RunWallClockBudgetSecs bounds a single resync's total duration.
    #[serde(default = "default_wall_clock_budget_secs")]
    pub run_wall_clock_budget_secs: u64,
}

fn default_pac_poll_interval_secs() -> u64 {
    60
}

fn default_metrics_bind_addr() -> String {
    "0.0.0.0:9464".to_string()
}

fn default_webhook_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_resolution_policy() -> String {
    "strict".to_string()
}

fn default_wall_clock_budget_secs() -> u64 {
    3600
}

impl Settings {
    /// Load layers a settings file (if `path` is given) under environment
    /// variables prefixed `OCEAN_` under the CLI overrides in `cli`.
    pub fn load(path: Option<&str>, cli: CliOverrides) -> Result<Self, Error> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(config::Environment::with_prefix("OCEAN").separator("__"));
        if let Some(pac_source) = cli.pac_source {
            builder = builder.set_override("pacSource", pac_source)?;
        }
        if let Some(metrics) = cli.metrics_bind_addr {
            builder = builder.set_override("metricsBindAddr", metrics)?;
        }
        if let Some(webhook) = cli.webhook_bind_addr {
            builder = builder.set_override("webhookBindAddr", webhook)?;
        }
        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// MetricsAddr parses [`Self::metrics_bind_addr`].
    pub fn metrics_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.metrics_bind_addr.parse()?)
    }

    /// WebhookAddr parses [`Self::webhook_bind_addr`].
    pub fn webhook_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.webhook_bind_addr.parse()?)
    }

    /// PacPollInterval is [`Self::pac_poll_interval_secs`] as a [`Duration`].
    pub fn pac_poll_interval(&self) -> Duration {
        Duration::from_secs(self.pac_poll_interval_secs)
    }

    /// RunWallClockBudget is [`Self::run_wall_clock_budget_secs`] as a
    /// [`Duration`].
    pub fn run_wall_clock_budget(&self) -> Duration {
        Duration::from_secs(self.run_wall_clock_budget_secs)
    }

    /// Policy parses [`Self::resolution_policy`], defaulting to strict on an
    /// unrecognized value.
    pub fn policy(&self) -> ocean_mapping::ResolutionPolicy {
        match self.resolution_policy.to_lowercase().as_str() {
            "permissive" => ocean_mapping::ResolutionPolicy::Permissive,
            _ => ocean_mapping::ResolutionPolicy::Strict,
        }
    }
}

/// CliOverrides carries the handful of settings the `run` subcommand also
/// accepts directly as flags, taking priority over file and environment
/// layers.
#[derive(Default)]
pub struct CliOverrides {
    /// PacSource overrides `pacSource`.
    pub pac_source: Option<String>,
    /// MetricsBindAddr overrides `metricsBindAddr`.
    pub metrics_bind_addr: Option<String>,
    /// WebhookBindAddr overrides `webhookBindAddr`.
    pub webhook_bind_addr: Option<String>,
}
