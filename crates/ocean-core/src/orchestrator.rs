use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use ocean_config::CompiledPac;
use ocean_model::{Blueprint, EntityKey, KindOutcome, KindRunState, RunState};
use ocean_port_client::{IntegrationState, KindIntegrationState, PortClient};
use parking_lot::Mutex;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{info, instrument, warn};

use crate::context::{Context, RunHandle};
use crate::error::{Error, Result};
use crate::pipeline::{Fetcher, KindPipeline, PipelineOptions};
use crate::telemetry::Metrics;

/// RunOutcome is the resync orchestrator's per-run terminal state
/// (`spec.md` §4.C6): `idle -> running -> {one of these four} -> idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Succeeded: every kind finished without a fetcher error and no upserts
    /// failed.
    Succeeded,
    /// PartiallyFailed: at least one kind had item-level failures but no
    /// kind-level failure.
    PartiallyFailed,
    /// Failed: at least one kind had a fetcher error, or the run could not
    /// talk to Port at all.
    Failed,
    /// Cancelled: the run's cancellation signal fired before completion.
    Cancelled,
}

impl RunOutcome {
    fn metric_label(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::PartiallyFailed => "partially_failed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// CycleStrategy records which of the two documented strategies
/// (`spec.md` §9, Cycles in blueprint relations) a dependency cycle was
/// handled with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleStrategy {
    /// RevisitOnce runs every kind in the cycle, then re-walks it once more
    /// so forward references resolve.
    RevisitOnce,
    /// PreCreatePlaceholders relies on `createMissingRelatedEntities` instead
    /// of a second pass.
    PreCreatePlaceholders,
}

/// DependencyGroup is one position in the dependency-ordered schedule: a
/// single kind, or (when a cycle exists) every kind in that cycle together.
#[derive(Clone, Debug)]
pub struct DependencyGroup {
    /// Kinds are the kind names scheduled together. Length 1 unless a
    /// dependency cycle forced them into the same group.
    pub kinds: Vec<String>,
}

/// DependencyPlan is the resync order: dependency kinds before the kinds that
/// reference them (`spec.md` §4.C6).
#[derive(Clone, Debug, Default)]
pub struct DependencyPlan {
    /// Groups is the schedule, dependencies-first.
    pub groups: Vec<DependencyGroup>,
}

/// Plan builds the dependency schedule for `pac`'s resources, consulting
/// `blueprints`' declared relations to find edges (`spec.md` §3, Blueprint:
/// "the core does not own blueprint schema; it only consults relation
/// declarations to derive kind ordering"). A kind whose own blueprint cannot
/// be evaluated statically (a non-literal `blueprint` expression) is placed
/// in its own singleton group with no inferred dependencies.
pub fn plan(pac: &CompiledPac, blueprints: &BTreeMap<String, Blueprint>) -> DependencyPlan {
    let mut graph = DiGraph::<String, ()>::new();
    let mut idx: HashMap<String, NodeIndex> = HashMap::new();
    for kind in pac.resources.keys() {
        idx.insert(kind.clone(), graph.add_node(kind.clone()));
    }

    let kind_blueprint: HashMap<String, String> = pac
        .resources
        .iter()
        .filter_map(|(kind, rc)| {
            rc.mapping
                .blueprint
                .evaluate_one(&serde_json::Value::Null)
                .ok()
                .and_then(|v| v.as_str().map(str::to_owned))
                .map(|bp| (kind.clone(), bp))
        })
        .collect();
    let blueprint_kind: HashMap<&str, &str> = kind_blueprint
        .iter()
        .map(|(kind, bp)| (bp.as_str(), kind.as_str()))
        .collect();

    for (kind, rc) in &pac.resources {
        let Some(own_blueprint) = kind_blueprint.get(kind) else {
            continue;
        };
        let Some(blueprint) = blueprints.get(own_blueprint) else {
            continue;
        };
        for relation_name in rc.mapping.relations.keys() {
            let Some(target_blueprint) = blueprint.relations.get(relation_name) else {
                continue;
            };
            let Some(&target_kind) = blueprint_kind.get(target_blueprint.as_str()) else {
                continue;
            };
            if let (Some(&dependency), Some(&dependent)) = (idx.get(target_kind), idx.get(kind)) {
                graph.update_edge(dependency, dependent, ());
            }
        }
    }

    let sccs = tarjan_scc(&graph);
    let mut comp_of: HashMap<NodeIndex, usize> = HashMap::new();
    for (i, comp) in sccs.iter().enumerate() {
        for &n in comp {
            comp_of.insert(n, i);
        }
    }

    // tarjan_scc's own component ordering is not relied on here; the
    // condensation graph below is acyclic by construction regardless of it,
    // and toposort gives the dependency-first order directly.
    let mut condensation = DiGraph::<usize, ()>::new();
    let comp_nodes: Vec<NodeIndex> = (0..sccs.len()).map(|i| condensation.add_node(i)).collect();
    for edge in graph.edge_indices() {
        let (u, v) = graph
            .edge_endpoints(edge)
            .expect("edge index came from this graph's own edge_indices");
        let (cu, cv) = (comp_of[&u], comp_of[&v]);
        if cu != cv {
            condensation.update_edge(comp_nodes[cu], comp_nodes[cv], ());
        }
    }
    let order =
        toposort(&condensation, None).expect("an SCC condensation is acyclic by construction");

    let groups = order
        .into_iter()
        .map(|node| {
            let comp_idx = condensation[node];
            DependencyGroup {
                kinds: sccs[comp_idx].iter().map(|&n| graph[n].clone()).collect(),
            }
        })
        .collect();

    DependencyPlan { groups }
}

/// Orchestrator runs a full resync: enumerates kinds in dependency order,
/// drives each kind's [`KindPipeline`], then deletes stale entities for the
/// kinds that finished cleanly (`spec.md` §4.C6). Grounded on `main.rs`'s
/// `JoinSet` fan-out over named controllers.
///
/// Stale deletion compares each kind's seen set against the *previous run's*
/// seen set, kept in memory for the orchestrator's lifetime: the persisted
/// integration state only carries an opaque `seenSummary` for observability
/// across process restarts (`spec.md` §6), not a literal keyset, so the
/// first run after a process restart never deletes stale entities.
pub struct Orchestrator {
    pac: Arc<CompiledPac>,
    port: Arc<PortClient>,
    blueprints: BTreeMap<String, Blueprint>,
    fetchers: HashMap<String, Arc<dyn Fetcher>>,
    opts: PipelineOptions,
    wall_clock_budget: Duration,
    error_sample_cap: usize,
    previous_seen: Mutex<HashMap<String, HashSet<EntityKey>>>,
}

impl Orchestrator {
    /// New builds an orchestrator over a compiled PAC, wiring one fetcher per
    /// configured kind.
    pub fn new(
        pac: Arc<CompiledPac>,
        port: Arc<PortClient>,
        blueprints: BTreeMap<String, Blueprint>,
        fetchers: HashMap<String, Arc<dyn Fetcher>>,
        opts: PipelineOptions,
        wall_clock_budget: Duration,
    ) -> Self {
        Self {
            pac,
            port,
            blueprints,
            fetchers,
            opts,
            wall_clock_budget,
            error_sample_cap: 20,
            previous_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Run executes one full resync, returning the terminal [`RunOutcome`]
    /// and the per-kind [`RunState`] it produced.
    #[instrument(skip_all)]
    pub async fn run(&self, ctx: Arc<Context>, handle: RunHandle) -> Result<(RunOutcome, RunState)> {
        let plan = plan(&self.pac, &self.blueprints);
        let mut state = RunState::new(handle.run_id.clone(), self.pac.resources.keys().cloned());

        let budget = tokio::time::sleep(self.wall_clock_budget);
        tokio::pin!(budget);

        'groups: for group in &plan.groups {
            let strategy = if group.kinds.len() > 1 {
                if self.pac.create_missing_related_entities {
                    CycleStrategy::PreCreatePlaceholders
                } else {
                    CycleStrategy::RevisitOnce
                }
            } else {
                CycleStrategy::RevisitOnce
            };
            if group.kinds.len() > 1 {
                info!(kinds = ?group.kinds, strategy = ?strategy, "running dependency cycle");
            }

            let passes = if strategy == CycleStrategy::RevisitOnce && group.kinds.len() > 1 {
                2
            } else {
                1
            };

            for _ in 0..passes {
                for kind in &group.kinds {
                    if handle.cancel.is_cancelled() {
                        break 'groups;
                    }
                    tokio::select! {
                        biased;
                        () = handle.cancel.cancelled() => break 'groups,
                        () = &mut budget => {
                            warn!("wall-clock budget exceeded, cancelling run");
                            handle.cancel.cancel();
                            break 'groups;
                        }
                        () = self.run_kind(kind, &ctx, &handle, &mut state) => {}
                    }
                }
            }
        }

        let outcome = if handle.cancel.is_cancelled() {
            RunOutcome::Cancelled
        } else {
            self.finish(&mut state, &plan).await
        };

        self.log_summary(&state, outcome);
        self.persist(&handle, &state, &outcome).await?;
        Ok((outcome, state))
    }

    /// Log_summary emits the per-kind summary log line required by
    /// `spec.md` §7 ("a healthy run logs a summary per kind... a degraded
    /// run additionally logs sampled error messages per error kind") and
    /// folds the same counters into the process-wide Prometheus counters.
    fn log_summary(&self, state: &RunState, outcome: RunOutcome) {
        for (kind, kind_state) in &state.kinds {
            let summary = kind_state.summary();
            if summary.errors.is_empty() {
                info!(
                    %kind,
                    fetched = summary.fetched,
                    mapped_ok = summary.mapped_ok,
                    mapped_fail = summary.mapped_fail,
                    upserted = summary.upserted,
                    deleted = summary.deleted,
                    "kind resync summary"
                );
            } else {
                warn!(
                    %kind,
                    fetched = summary.fetched,
                    mapped_ok = summary.mapped_ok,
                    mapped_fail = summary.mapped_fail,
                    upserted = summary.upserted,
                    deleted = summary.deleted,
                    errors = ?summary.errors,
                    "kind resync summary (degraded)"
                );
            }
            Metrics::record_kind_counters(
                kind,
                summary.fetched,
                summary.upserted,
                summary.failed,
                summary.deleted,
            );
        }
        Metrics::record_run_outcome(outcome.metric_label());
    }

    async fn run_kind(&self, kind: &str, ctx: &Arc<Context>, handle: &RunHandle, state: &mut RunState) {
        let Some(rc) = self.pac.resources.get(kind) else {
            return;
        };
        let Some(fetcher) = self.fetchers.get(kind) else {
            warn!(kind, "no fetcher registered for kind, skipping");
            return;
        };
        let pipeline = KindPipeline::new(
            kind.to_string(),
            Arc::new(rc.clone()),
            fetcher.clone(),
            self.opts.clone(),
        );
        let kind_state = state.kind_mut(kind);
        pipeline.run(ctx.clone(), handle, kind_state).await;
    }

    /// Finish computes the run's terminal outcome, issues stale-deletion
    /// deletes for every kind that finished cleanly against the in-memory
    /// previous-seen snapshot (`spec.md` §4.C6), then replaces that snapshot
    /// with this run's.
    ///
    /// When the PAC's `deleteDependentEntities` flag is set, deletes are
    /// ordered by the reverse of `plan`'s dependency-first schedule (leaves,
    /// i.e. the kinds nothing else depends on, deleted before the kinds they
    /// reference), since the remote catalog may reject deleting an entity
    /// that something else still points to (`spec.md` §9: "stale-deletion
    /// batch ordering in the presence of dependency cycles... implementations
    /// may choose any order that does not violate foreign-key expectations").
    /// Without the flag, deletes run in whatever order `state.kinds` yields
    /// them, as before.
    async fn finish(&self, state: &mut RunState, plan: &DependencyPlan) -> RunOutcome {
        let mut any_fetcher_failed = false;
        let mut any_item_failed = false;

        let previous_seen = self.previous_seen.lock().clone();
        let mut next_seen: HashMap<String, HashSet<EntityKey>> = HashMap::new();
        let mut to_delete: Vec<(String, EntityKey)> = Vec::new();

        for (kind, kind_state) in &state.kinds {
            if kind_state.outcome == KindOutcome::FetcherFailed {
                any_fetcher_failed = true;
                continue;
            }
            if kind_state.failed > 0 || kind_state.mapped_fail > 0 {
                any_item_failed = true;
            }
            next_seen.insert(kind.clone(), kind_state.seen.clone());
            if let Some(prior) = previous_seen.get(kind) {
                to_delete.extend(
                    prior
                        .difference(&kind_state.seen)
                        .cloned()
                        .map(|key| (kind.clone(), key)),
                );
            }
        }
        *self.previous_seen.lock() = next_seen;

        if self.pac.delete_dependent_entities {
            let order_index: HashMap<&str, usize> = plan
                .groups
                .iter()
                .enumerate()
                .flat_map(|(i, group)| group.kinds.iter().map(move |kind| (kind.as_str(), i)))
                .collect();
            to_delete.sort_by_key(|(kind, _)| {
                std::cmp::Reverse(order_index.get(kind.as_str()).copied().unwrap_or(0))
            });
        }

        for (kind, key) in to_delete {
            match self.port.delete(&key).await {
                Ok(_) => {
                    state.kind_mut(&kind).deleted = state.kind_mut(&kind).deleted.saturating_add(1);
                }
                Err(e) => {
                    state
                        .kind_mut(&kind)
                        .sample_error("PermanentRemoteError", e.to_string(), self.error_sample_cap);
                }
            }
        }

        if any_fetcher_failed {
            RunOutcome::Failed
        } else if any_item_failed {
            RunOutcome::PartiallyFailed
        } else {
            RunOutcome::Succeeded
        }
    }

    async fn persist(&self, handle: &RunHandle, state: &RunState, outcome: &RunOutcome) -> Result<()> {
        let now = chrono::Utc::now();
        let mut per_kind = BTreeMap::new();
        for (kind, kind_state) in &state.kinds {
            let mut counters = BTreeMap::new();
            counters.insert("fetched".to_string(), kind_state.fetched);
            counters.insert("mappedOk".to_string(), kind_state.mapped_ok);
            counters.insert("mappedFail".to_string(), kind_state.mapped_fail);
            counters.insert("upserted".to_string(), kind_state.upserted);
            counters.insert("failed".to_string(), kind_state.failed);
            counters.insert("deleted".to_string(), kind_state.deleted);
            per_kind.insert(
                kind.clone(),
                KindIntegrationState {
                    seen_summary: format!("{} keys", kind_state.seen.len()),
                    last_success_ts: (kind_state.outcome == KindOutcome::FetcherOk).then_some(now),
                    counters,
                },
            );
        }
        let integration_state = IntegrationState {
            last_run_id: handle.run_id.clone(),
            last_success_timestamp: matches!(outcome, RunOutcome::Succeeded).then_some(now),
            per_kind,
        };
        self.port
            .set_integration_state(&integration_state)
            .await
            .map_err(Error::PortClient)?;
        Ok(())
    }
}
