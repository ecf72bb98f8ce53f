use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::compile::{compile, CompiledPac};
use crate::error::ConfigError;
use crate::source::{fetch_bytes, load, parse_tagged, Source};

/// ConfigService holds the current compiled PAC and keeps it up to date: a local
/// source is watched for filesystem changes, a remote source is polled on an
/// interval and recompiled only when its content actually changes. Hot-reload
/// only ever swaps the whole snapshot; an in-flight run keeps using the
/// [`CompiledPac`] it started with until it checks again (`spec.md` §9, Open
/// Question: hot-reload mid-run policy).
pub struct ConfigService {
    rx: watch::Receiver<Arc<CompiledPac>>,
}

impl ConfigService {
    /// Start loads `source` once synchronously, then spawns a background task to
    /// keep the snapshot current.
    pub async fn start(source: Source, poll_interval: Duration) -> Result<Self, ConfigError> {
        let initial = compile(&load(&source).await?);
        let (tx, rx) = watch::channel(Arc::new(initial));

        match source.clone() {
            Source::Local(path) => spawn_local_watch(path, tx),
            Source::Remote { .. } => spawn_remote_poll(source, tx, poll_interval),
        }

        Ok(Self { rx })
    }

    /// Current returns the most recently compiled PAC.
    pub fn current(&self) -> Arc<CompiledPac> {
        self.rx.borrow().clone()
    }

    /// Subscribe returns a receiver that observes every future reload.
    pub fn subscribe(&self) -> watch::Receiver<Arc<CompiledPac>> {
        self.rx.clone()
    }
}

fn spawn_local_watch(path: PathBuf, tx: watch::Sender<Arc<CompiledPac>>) {
    let (notify_tx, mut notify_rx) = mpsc::channel(16);
    let watch_path = path.clone();

    // notify's watcher must stay alive for as long as we want events, and its
    // callback runs on notify's own thread; park a dedicated thread to hold it.
    std::thread::spawn(move || {
        let mut watcher = match RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if res.is_ok() {
                    let _ = notify_tx.blocking_send(());
                }
            },
            notify::Config::default(),
        ) {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, "failed to start config watcher");
                return;
            }
        };
        if let Err(e) = watcher.watch(&watch_path, RecursiveMode::NonRecursive) {
            warn!(error = %e, "failed to watch config path");
            return;
        }
        loop {
            std::thread::park();
        }
    });

    tokio::spawn(async move {
        while notify_rx.recv().await.is_some() {
            match load(&Source::Local(path.clone())).await {
                Ok(pac) => {
                    let compiled = compile(&pac);
                    info!(disabled = compiled.disabled.len(), "reloaded config");
                    let _ = tx.send(Arc::new(compiled));
                }
                Err(e) => warn!(error = %e, "failed to reload config"),
            }
        }
    });
}

fn spawn_remote_poll(source: Source, tx: watch::Sender<Arc<CompiledPac>>, interval: Duration) {
    tokio::spawn(async move {
        let mut last_hash: Option<Vec<u8>> = None;
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let (bytes, tag) = match fetch_bytes(&source).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "failed to poll remote config");
                    continue;
                }
            };
            let hash = Sha256::digest(&bytes).to_vec();
            if last_hash.as_ref() == Some(&hash) {
                continue;
            }
            last_hash = Some(hash);

            match parse_tagged(&bytes, tag) {
                Ok(pac) => {
                    let compiled = compile(&pac);
                    info!(disabled = compiled.disabled.len(), "reloaded config");
                    let _ = tx.send(Arc::new(compiled));
                }
                Err(e) => warn!(error = %e, "failed to parse polled config"),
            }
        }
    });
}
