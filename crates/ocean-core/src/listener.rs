use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::context::{Context, RunHandle};
use crate::orchestrator::Orchestrator;

/// QueueSubscriber is a queue-driven listener's message source: an
/// integration-supplied subscription to an external queue (SQS, Kafka, a
/// webhook relay) that triggers one resync per message and commits the
/// message only after the triggered run finishes (`spec.md` §4.C8).
#[async_trait]
pub trait QueueSubscriber: Send + Sync {
    /// Next waits for and returns the next message's opaque commit token, or
    /// `None` once the subscription is closed for good.
    async fn next(&mut self) -> Option<String>;

    /// Ack commits `token`. A crash between [`next`](Self::next) and `ack`
    /// replays the trigger on restart rather than silently dropping it.
    async fn ack(&mut self, token: String);
}

/// ListenerStrategy selects how a resync run is triggered; chosen once at
/// startup from the PAC's `eventListener` configuration and not switched
/// mid-process (`spec.md` §4.C8).
pub enum ListenerStrategy {
    /// Scheduled triggers a run on a fixed interval.
    Scheduled {
        /// Interval is the time between successive run starts.
        interval: Duration,
    },
    /// Once triggers exactly one run, then the listener exits.
    Once,
    /// WebhookDriven never triggers a resync on its own; the webhook manager
    /// is a separate HTTP surface that writes directly to Port per delivery.
    WebhookDriven,
    /// QueueDriven triggers one run per message observed on `subscriber`.
    QueueDriven {
        /// Subscriber is the queue's message source.
        subscriber: Box<dyn QueueSubscriber>,
    },
}

impl ListenerStrategy {
    /// Run drives the selected strategy until `cancel` fires.
    #[instrument(skip_all)]
    pub async fn run(self, orchestrator: Arc<Orchestrator>, ctx: Arc<Context>, cancel: CancellationToken) {
        match self {
            Self::Scheduled { interval } => {
                Self::run_scheduled(orchestrator, ctx, cancel, interval).await;
            }
            Self::Once => Self::trigger(&orchestrator, &ctx, &cancel).await,
            Self::WebhookDriven => cancel.cancelled().await,
            Self::QueueDriven { mut subscriber } => {
                Self::run_queue(orchestrator, ctx, cancel, subscriber.as_mut()).await;
            }
        }
    }

    async fn run_scheduled(
        orchestrator: Arc<Orchestrator>,
        ctx: Arc<Context>,
        cancel: CancellationToken,
        interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    Self::trigger(&orchestrator, &ctx, &cancel).await;
                }
            }
        }
    }

    async fn run_queue(
        orchestrator: Arc<Orchestrator>,
        ctx: Arc<Context>,
        cancel: CancellationToken,
        subscriber: &mut dyn QueueSubscriber,
    ) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = subscriber.next() => {
                    match next {
                        None => break,
                        Some(token) => {
                            Self::trigger(&orchestrator, &ctx, &cancel).await;
                            subscriber.ack(token).await;
                        }
                    }
                }
            }
        }
    }

    async fn trigger(orchestrator: &Arc<Orchestrator>, ctx: &Arc<Context>, cancel: &CancellationToken) {
        let handle = RunHandle::new(cancel.child_token());
        match orchestrator.run(ctx.clone(), handle).await {
            Ok((outcome, _state)) => info!(?outcome, "resync finished"),
            Err(e) => warn!(error = %e, "resync failed to complete"),
        }
    }
}
