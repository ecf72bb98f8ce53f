#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

//! Ocean_core wires the compiled PAC, the Port client and a set of
//! user-supplied fetchers into a running integration: the resync
//! orchestrator, the per-kind pipeline, the webhook processor manager, and
//! the listener strategies that decide when a resync starts.
//!
//! Everything here is generic over the embedding integration's fetchers and
//! webhook processors; this crate owns scheduling and bookkeeping, never the
//! shape of a specific third-party API.

mod context;
mod error;
mod gate;
mod listener;
mod orchestrator;
mod pipeline;
mod telemetry;
mod webhook;

pub use context::{Context, RunHandle};
pub use error::{Error, FetcherError, Result};
pub use gate::KeyedGate;
pub use listener::{ListenerStrategy, QueueSubscriber};
pub use orchestrator::{CycleStrategy, DependencyGroup, DependencyPlan, Orchestrator, RunOutcome};
pub use pipeline::{Fetcher, KindPipeline, PipelineOptions, RecordBatch};
pub use telemetry::Metrics;
pub use webhook::{WebhookManager, WebhookProcessor};
