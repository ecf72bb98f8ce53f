use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{instrument, warn};

use crate::context::Context;
use crate::error::FetcherError;
use crate::telemetry::Metrics;

/// WebhookProcessor is one registered webhook integration: it authenticates
/// its own deliveries, decides which resync kinds it produces entities for,
/// and turns a single delivery into Port upserts/deletes (`spec.md` §4.C7).
/// Implemented by the embedding integration, never by this crate.
#[async_trait]
pub trait WebhookProcessor: Send + Sync {
    /// Id names this processor; also the path segment deliveries arrive on.
    fn id(&self) -> &str;

    /// Kinds lists the resource kinds this processor affects, so the manager
    /// can refuse to start a kind's resync while one of its webhooks is still
    /// queued (`spec.md` §4.C7, interaction with resync).
    fn kinds(&self) -> &[String];

    /// Verify checks a delivery's authenticity from its headers and raw body.
    /// Rejected deliveries never reach [`handle`](Self::handle).
    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> bool;

    /// Routing_key groups deliveries that must be processed in arrival order.
    /// Deliveries with different keys may run concurrently; same-key
    /// deliveries are serialized through one queue (`spec.md` §9, webhook
    /// ordering strategy (a)). Must return the same string as the affected
    /// entity's `EntityKey` display (e.g. `"repository/42"`), since that is
    /// also the key the resync pipeline gates its upserts on; returning
    /// anything else means a same-entity race with resync is not actually
    /// prevented.
    fn routing_key(&self, payload: &Value) -> String;

    /// Handle applies one delivery's payload, typically ending in a direct
    /// [`ocean_port_client::PortClient`] upsert or delete rather than a full
    /// kind resync.
    async fn handle(&self, ctx: Arc<Context>, payload: Value) -> Result<(), FetcherError>;
}

struct QueuedDelivery {
    payload: Value,
    routing_key: String,
}

/// WebhookManager receives HTTP deliveries, authenticates and routes them to
/// their processor, and serializes same-key deliveries through a per-key
/// queue so a rapid-fire create-then-update pair for one entity is never
/// reordered (`spec.md` §4.C7). Grounded on the teacher's webhook `State`/
/// `app` split (`controller/src/webhook/mod.rs`).
pub struct WebhookManager {
    ctx: Arc<Context>,
    processors: HashMap<String, Arc<dyn WebhookProcessor>>,
    queues: Mutex<HashMap<String, mpsc::Sender<QueuedDelivery>>>,
    queue_capacity: usize,
}

impl WebhookManager {
    /// New builds a manager over `processors`, keyed by their own
    /// [`WebhookProcessor::id`].
    pub fn new(ctx: Arc<Context>, processors: Vec<Arc<dyn WebhookProcessor>>) -> Self {
        let processors = processors
            .into_iter()
            .map(|p| (p.id().to_string(), p))
            .collect();
        Self {
            ctx,
            processors,
            queues: Mutex::new(HashMap::new()),
            queue_capacity: 64,
        }
    }

    /// Router returns the axum `Router` serving every registered processor
    /// under `/webhooks/:processor_id`.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/webhooks/:processor_id", post(deliver))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }

    async fn enqueue(&self, processor_id: &str, processor: &Arc<dyn WebhookProcessor>, payload: Value) {
        let routing_key = processor.routing_key(&payload);
        let queue_key = format!("{processor_id}:{routing_key}");
        let mut queues = self.queues.lock();
        let usable = queues.get(&queue_key).map(|s| (!s.is_closed(), s.clone()));
        let sender = match usable {
            Some((true, sender)) => sender,
            _ => self.spawn_dispatcher(&mut queues, queue_key.clone(), processor.clone()),
        };
        drop(queues);
        if sender
            .send(QueuedDelivery { payload, routing_key })
            .await
            .is_err()
        {
            warn!(key = %queue_key, "webhook dispatcher queue closed before delivery could be sent");
        }
    }

    fn spawn_dispatcher(
        &self,
        queues: &mut HashMap<String, mpsc::Sender<QueuedDelivery>>,
        key: String,
        processor: Arc<dyn WebhookProcessor>,
    ) -> mpsc::Sender<QueuedDelivery> {
        let (tx, mut rx) = mpsc::channel::<QueuedDelivery>(self.queue_capacity);
        let ctx = self.ctx.clone();
        let dispatch_key = key.clone();
        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                // Gated on the entity key (not `dispatch_key`, which carries
                // the processor-id prefix), so this actually contends with
                // the resync pipeline's upsert gate for the same entity.
                let _guard = ctx.gate.guard(&delivery.routing_key).await;
                if let Err(e) = processor.handle(ctx.clone(), delivery.payload).await {
                    warn!(key = %dispatch_key, error = %e, "webhook processor failed");
                }
            }
        });
        queues.insert(key, tx.clone());
        tx
    }
}

#[instrument(skip_all, fields(processor_id = %processor_id))]
async fn deliver(
    State(manager): State<Arc<WebhookManager>>,
    Path(processor_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(processor) = manager.processors.get(&processor_id).cloned() else {
        Metrics::record_webhook_delivery(&processor_id, false);
        return StatusCode::NOT_FOUND;
    };
    if !processor.verify(&headers, &body) {
        Metrics::record_webhook_delivery(&processor_id, false);
        return StatusCode::UNAUTHORIZED;
    }
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => {
            Metrics::record_webhook_delivery(&processor_id, false);
            return StatusCode::BAD_REQUEST;
        }
    };
    manager.enqueue(&processor_id, &processor, payload).await;
    Metrics::record_webhook_delivery(&processor_id, true);
    StatusCode::ACCEPTED
}

/// Verify_hmac_sha256 checks that `signature_hex` is the lowercase-hex
/// HMAC-SHA256 of `body` under `secret`, using a constant-time comparison so
/// timing cannot leak the expected signature. A processor's
/// [`WebhookProcessor::verify`] implementation typically delegates here.
pub fn verify_hmac_sha256(secret: &[u8], body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();
    computed.as_slice().ct_eq(&expected).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_hmac_sha256_accepts_matching_signature() {
        let secret = b"topsecret";
        let body = b"{\"hello\":true}";
        let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());
        assert!(verify_hmac_sha256(secret, body, &sig));
    }

    #[test]
    fn verify_hmac_sha256_rejects_wrong_signature() {
        assert!(!verify_hmac_sha256(b"secret", b"body", "deadbeef"));
    }
}
