#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

//! Ocean_port_client is the only part of the runtime that talks HTTP to Port. It
//! batches entity mutations, caps in-flight concurrency, retries transient
//! failures with backoff and jitter, narrows concurrency under sustained 429/5xx
//! pressure (additive-increase/multiplicative-decrease), and implements
//! [`ocean_mapping::SearchResolver`] for strict-mode relation resolution.

mod auth;
mod batch;
mod client;
mod error;
mod ratelimit;

pub use batch::{BatchOptions, Batcher};
pub use client::{
    DeleteOutcome, IntegrationState, KindIntegrationState, PortClient, PortClientConfig,
    UpsertOutcome,
};
pub use error::PortClientError;
