use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::BoxStream;
use futures::StreamExt;
use ocean_mapping::{map_batch, CompiledResourceConfig, MapOutcome};
use ocean_model::{Entity, KindOutcome, KindRunState, RawRecord};
use ocean_port_client::BatchOptions;
use tracing::{instrument, warn};

use crate::context::{Context, RunHandle};
use crate::error::FetcherError;

/// RecordBatch is one batch a [`Fetcher`] yields.
pub type RecordBatch = Vec<RawRecord>;

/// Fetcher is the per-integration, per-kind data source: a lazy sequence
/// producer that yields finite batches of raw records and may fail partway
/// through (`spec.md` §4.C5). Implemented by the embedding integration, never
/// by this crate.
pub trait Fetcher: Send + Sync {
    /// Fetch returns a stream of record batches for this run. The stream ends
    /// on its own once the source is exhausted; it does not need to observe
    /// cancellation itself; the pipeline stops polling it once the run's
    /// cancellation signal fires.
    fn fetch(&self, ctx: Arc<Context>) -> BoxStream<'static, Result<RecordBatch, FetcherError>>;
}

/// PipelineOptions bounds one kind pipeline's mapping concurrency, batching,
/// error sampling, and cancellation grace period.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    /// MappingConcurrency caps in-flight `ocean-mapping` calls per batch.
    pub mapping_concurrency: usize,
    /// BatchOptions bounds each blueprint's accumulating upsert batch.
    pub batch_options: BatchOptions,
    /// ErrorSampleCap bounds how many sampled error messages a kind keeps.
    pub error_sample_cap: usize,
    /// GracePeriod bounds how long the pipeline waits for in-flight batches
    /// to drain after cancellation before abandoning them (`spec.md` §4.C5).
    pub grace_period: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            mapping_concurrency: 8,
            batch_options: BatchOptions::default(),
            error_sample_cap: 20,
            grace_period: Duration::from_secs(10),
        }
    }
}

/// EntityBatch accumulates one blueprint's entities for the current batch,
/// same item/byte/dwell-time limits as [`ocean_port_client::Batcher`], but
/// keyed by identifier: a second observation of an already-accumulated
/// `(blueprint, identifier)` within the same open batch folds into the first
/// via [`Entity::merge`] instead of upserting the same key twice in one
/// run (`spec.md` §3, `enableMergeEntity`).
struct EntityBatch {
    items: HashMap<String, Entity>,
    bytes: usize,
    opts: BatchOptions,
    opened_at: Instant,
    union_relations: bool,
}

impl EntityBatch {
    fn new(opts: BatchOptions, union_relations: bool) -> Self {
        Self {
            items: HashMap::new(),
            bytes: 0,
            opts,
            opened_at: Instant::now(),
            union_relations,
        }
    }

    fn byte_len(entity: &Entity) -> usize {
        serde_json::to_vec(entity).map(|v| v.len()).unwrap_or(0)
    }

    /// Push folds `entity` into the batch, merging it with any entity
    /// already accumulated under the same identifier. Returns the drained
    /// batch if a genuinely new identifier crosses the item-count or
    /// byte-budget limit; a merge never does, since it does not grow the
    /// batch's item count.
    fn push(&mut self, entity: Entity) -> Option<Vec<Entity>> {
        let identifier = entity.identifier.clone();
        if let Some(existing) = self.items.remove(&identifier) {
            self.bytes = self.bytes.saturating_sub(Self::byte_len(&existing));
            let merged = existing.merge(entity, self.union_relations);
            self.bytes = self.bytes.saturating_add(Self::byte_len(&merged));
            self.items.insert(identifier, merged);
            return None;
        }

        let item_len = Self::byte_len(&entity);
        let would_overflow_items = self.items.len().saturating_add(1) > self.opts.max_items;
        let would_overflow_bytes =
            !self.items.is_empty() && self.bytes.saturating_add(item_len) > self.opts.max_bytes;
        let drained = if would_overflow_items || would_overflow_bytes {
            Some(self.take())
        } else {
            None
        };
        self.items.insert(identifier, entity);
        self.bytes = self.bytes.saturating_add(item_len);
        drained
    }

    fn should_flush(&self) -> bool {
        !self.items.is_empty() && self.opened_at.elapsed() >= self.opts.max_dwell
    }

    fn take(&mut self) -> Vec<Entity> {
        self.bytes = 0;
        self.opened_at = Instant::now();
        self.items.drain().map(|(_, v)| v).collect()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// KindPipeline runs one kind's resync sweep: fetch, map, dedupe into
/// per-blueprint batches, upsert, record results (`spec.md` §4.C5). Grounded
/// on the teacher's per-CRD controller functions, generalized from a
/// Kubernetes watch loop to a finite fetch-to-exhaustion stream.
pub struct KindPipeline {
    kind: String,
    rc: Arc<CompiledResourceConfig>,
    fetcher: Arc<dyn Fetcher>,
    opts: PipelineOptions,
}

impl KindPipeline {
    /// New builds a pipeline for `kind`, driven by `fetcher`.
    pub fn new(
        kind: impl Into<String>,
        rc: Arc<CompiledResourceConfig>,
        fetcher: Arc<dyn Fetcher>,
        opts: PipelineOptions,
    ) -> Self {
        Self {
            kind: kind.into(),
            rc,
            fetcher,
            opts,
        }
    }

    /// Run drives the kind to completion (or cancellation), writing every
    /// outcome into `state`.
    #[instrument(skip_all, fields(kind = %self.kind, run_id = %handle.run_id))]
    pub async fn run(&self, ctx: Arc<Context>, handle: &RunHandle, state: &mut KindRunState) {
        let mut stream = self.fetcher.fetch(ctx.clone());
        let mut batchers: HashMap<String, EntityBatch> = HashMap::new();
        let mut dwell = tokio::time::interval(Duration::from_millis(500));
        dwell.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = handle.cancel.cancelled() => {
                    tracing::debug!("cancellation observed, draining in-flight batches");
                    break;
                }
                _ = dwell.tick() => {
                    self.flush_dwelling(&ctx, state, &mut batchers).await;
                }
                next = stream.next() => {
                    match next {
                        None => break,
                        Some(Err(e)) => {
                            state.outcome = KindOutcome::FetcherFailed;
                            state.sample_error("FetcherError", e.to_string(), self.opts.error_sample_cap);
                            warn!(error = %e, "fetcher raised, stale deletion will be skipped for this kind");
                            break;
                        }
                        Some(Ok(records)) => {
                            self.ingest(&ctx, state, &mut batchers, records).await;
                        }
                    }
                }
            }
        }

        let drain = self.flush_all(&ctx, state, &mut batchers);
        if tokio::time::timeout(self.opts.grace_period, drain).await.is_err() {
            warn!("grace period elapsed before all in-flight batches drained");
        }
    }

    async fn ingest(
        &self,
        ctx: &Context,
        state: &mut KindRunState,
        batchers: &mut HashMap<String, EntityBatch>,
        records: RecordBatch,
    ) {
        let fetched = u64::try_from(records.len()).unwrap_or(u64::MAX);
        state.fetched = state.fetched.saturating_add(fetched);
        let outcomes = map_batch(
            &records,
            &self.rc,
            ctx.policy,
            ctx.port.as_ref(),
            self.opts.mapping_concurrency,
        )
        .await;

        for outcome in outcomes {
            match outcome {
                MapOutcome::Filtered => {}
                MapOutcome::Mapped(entity) => {
                    state.mapped_ok = state.mapped_ok.saturating_add(1);
                    let blueprint = entity.blueprint.clone();
                    let union_relations = ctx.pac.enable_merge_entity;
                    let batcher = batchers
                        .entry(blueprint)
                        .or_insert_with(|| EntityBatch::new(self.opts.batch_options, union_relations));
                    if let Some(full) = batcher.push(*entity) {
                        self.upsert(ctx, state, full).await;
                    }
                }
                MapOutcome::Failed(err) => {
                    state.mapped_fail = state.mapped_fail.saturating_add(1);
                    state.sample_error("MappingError", err.to_string(), self.opts.error_sample_cap);
                }
            }
        }
    }

    async fn flush_dwelling(
        &self,
        ctx: &Context,
        state: &mut KindRunState,
        batchers: &mut HashMap<String, EntityBatch>,
    ) {
        let ready: Vec<String> = batchers
            .iter()
            .filter(|(_, b)| b.should_flush())
            .map(|(k, _)| k.clone())
            .collect();
        for blueprint in ready {
            if let Some(batcher) = batchers.get_mut(&blueprint) {
                let batch = batcher.take();
                if !batch.is_empty() {
                    self.upsert(ctx, state, batch).await;
                }
            }
        }
    }

    async fn flush_all(
        &self,
        ctx: &Context,
        state: &mut KindRunState,
        batchers: &mut HashMap<String, EntityBatch>,
    ) {
        for (_, mut batcher) in batchers.drain() {
            if !batcher.is_empty() {
                let batch = batcher.take();
                self.upsert(ctx, state, batch).await;
            }
        }
    }

    /// Upsert sends one blueprint's batch to Port. Every entity key in the
    /// batch is gated (sorted first, to avoid lock-order deadlock against a
    /// concurrent multi-key webhook delivery) so a webhook delivery for the
    /// same entity cannot interleave with this write (`spec.md` §9,
    /// webhook/resync ordering strategy (a)).
    async fn upsert(&self, ctx: &Context, state: &mut KindRunState, batch: Vec<Entity>) {
        let Some(blueprint) = batch.first().map(|e| e.blueprint.clone()) else {
            return;
        };
        let mut keys: Vec<String> = batch.iter().map(|e| e.key().to_string()).collect();
        keys.sort_unstable();
        keys.dedup();
        let _guards: Vec<_> = {
            let mut guards = Vec::with_capacity(keys.len());
            for key in &keys {
                guards.push(ctx.gate.guard(key).await);
            }
            guards
        };

        let outcomes = ctx.port.upsert_batch(&blueprint, batch).await;
        for outcome in outcomes {
            match outcome.result {
                Ok(()) => state.record_seen(outcome.key),
                Err(e) => {
                    state.failed = state.failed.saturating_add(1);
                    state.sample_error("PermanentRemoteError", e.to_string(), self.opts.error_sample_cap);
                }
            }
        }
    }
}
