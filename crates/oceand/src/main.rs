//! `oceand` hosts a single Ocean integration: it loads a port-app-config,
//! watches it for changes, and runs the resync and webhook surfaces described
//! by it. It ships with no built-in data fetchers or webhook processors of
//! its own; wiring those in for a specific third-party system is outside this
//! runtime's scope.

mod error;
mod settings;

use std::collections::{BTreeMap, HashMap};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Arg, ArgMatches, Command};
use is_terminal::IsTerminal;
use ocean_config::ConfigService;
use ocean_core::{Context, ListenerStrategy, Metrics, Orchestrator, PipelineOptions, WebhookManager};
use ocean_port_client::{PortClient, PortClientConfig};
use settings::{CliOverrides, Settings};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::error::Error;

fn cli() -> Command {
    Command::new("oceand")
        .about("Ocean integration runtime daemon")
        .subcommand_required(true)
        .subcommand(
            Command::new("run")
                .visible_alias("sail")
                .about("Load a port-app-config and run its resync and webhook surfaces")
                .arg(
                    Arg::new("settings")
                        .long("settings")
                        .env("OCEAND_SETTINGS")
                        .help("path to an oceand settings file (toml/json/yaml)"),
                )
                .arg(
                    Arg::new("pac-source")
                        .long("pac-source")
                        .env("OCEAND_PAC_SOURCE")
                        .help("local file path or remote URL for the port-app-config"),
                )
                .arg(
                    Arg::new("metrics-bind-addr")
                        .long("metrics-bind-addr")
                        .env("OCEAND_METRICS_BIND_ADDR")
                        .help("socket address the Prometheus exporter listens on"),
                )
                .arg(
                    Arg::new("webhook-bind-addr")
                        .long("webhook-bind-addr")
                        .env("OCEAND_WEBHOOK_BIND_ADDR")
                        .help("socket address the webhook delivery surface listens on"),
                ),
        )
        .subcommand(
            Command::new("new")
                .about("Scaffold a new integration (not implemented by this runtime)"),
        )
}

fn main() -> ExitCode {
    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("new", _)) => {
            eprintln!("scaffolding is outside this runtime's scope");
            ExitCode::from(1)
        }
        Some(("run", sub)) => run_subcommand(sub),
        _ => ExitCode::from(2),
    }
}

fn run_subcommand(sub: &ArgMatches) -> ExitCode {
    if let Err(e) = install_tracing() {
        eprintln!("failed to install tracing subscriber: {e}");
        return ExitCode::from(1);
    }

    let overrides = CliOverrides {
        pac_source: sub.get_one::<String>("pac-source").cloned(),
        metrics_bind_addr: sub.get_one::<String>("metrics-bind-addr").cloned(),
        webhook_bind_addr: sub.get_one::<String>("webhook-bind-addr").cloned(),
    };
    let settings_path = sub.get_one::<String>("settings").map(String::as_str);

    let settings = match Settings::load(settings_path, overrides) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to load settings");
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(run(settings)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "oceand exited with an error");
            ExitCode::from(2)
        }
    }
}

fn install_tracing() -> Result<(), Error> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let collector = tracing_subscriber::Registry::default()
        .with(env_filter)
        .with(if std::io::stdout().is_terminal() {
            Some(tracing_subscriber::fmt::layer())
        } else {
            None
        })
        .with(if std::io::stdout().is_terminal() {
            None
        } else {
            Some(tracing_subscriber::fmt::layer().json())
        });
    tracing::subscriber::set_global_default(collector)?;
    Ok(())
}

async fn run(settings: Settings) -> Result<(), Error> {
    let metrics_addr = settings.metrics_addr()?;
    let webhook_addr = settings.webhook_addr()?;
    Metrics::install(metrics_addr);

    let source = parse_source(&settings.pac_source);
    let config_service = ConfigService::start(source, settings.pac_poll_interval()).await?;
    let pac = config_service.current();

    let port = Arc::new(PortClient::new(PortClientConfig {
        base_url: settings.port_base_url.clone(),
        client_id: settings.port_client_id.clone(),
        client_secret: settings.port_client_secret.clone(),
        integration_identifier: settings.integration_identifier.clone(),
        max_attempts: 7,
        initial_concurrency: 10,
        min_concurrency: 1,
        max_concurrency: 50,
    }));

    let ctx = Arc::new(Context::new(pac.clone(), port.clone(), settings.policy()));

    // oceand ships with no built-in fetchers: wiring a specific third-party
    // system's data sources in is outside this runtime's scope. A kind with
    // no registered fetcher is skipped at resync time and logged once.
    let orchestrator = Arc::new(Orchestrator::new(
        pac.clone(),
        port.clone(),
        BTreeMap::new(),
        HashMap::new(),
        PipelineOptions::default(),
        settings.run_wall_clock_budget(),
    ));

    let webhook_manager = Arc::new(WebhookManager::new(ctx.clone(), Vec::new()));
    let listener = ListenerStrategy::Scheduled {
        interval: settings.pac_poll_interval(),
    };

    let cancel = CancellationToken::new();
    let shutdown_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown_signal.cancel();
        }
    });

    let mut tasks = tokio::task::JoinSet::new();

    let listener_orchestrator = orchestrator.clone();
    let listener_ctx = ctx.clone();
    let listener_cancel = cancel.clone();
    tasks.spawn(async move {
        listener.run(listener_orchestrator, listener_ctx, listener_cancel).await;
    });

    let router = webhook_manager.router();
    let webhook_cancel = cancel.clone();
    tasks.spawn(async move {
        let listener = match tokio::net::TcpListener::bind(webhook_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "failed to bind webhook listener");
                return;
            }
        };
        let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
            webhook_cancel.cancelled().await;
        });
        if let Err(e) = serve.await {
            error!(error = %e, "webhook server exited with an error");
        }
    });

    while tasks.join_next().await.is_some() {}
    Ok(())
}

fn parse_source(raw: &str) -> ocean_config::Source {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        ocean_config::Source::Remote {
            url: raw.to_string(),
            bearer_token: None,
        }
    } else {
        ocean_config::Source::Local(raw.into())
    }
}
