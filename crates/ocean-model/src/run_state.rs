use std::collections::{BTreeMap, HashSet};

use crate::EntityKey;

/// ErrorSample is one sampled error message recorded against an error kind, for the
/// run's degraded-run log line (see `spec.md` §7).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorSample {
    /// Kind names the error kind, e.g. `"MappingError"`, `"PermanentRemoteError"`.
    pub kind: &'static str,
    /// Message is the sampled error's rendered message.
    pub message: String,
}

/// KindOutcome is whether a kind's fetcher ran to completion this run.
///
/// A kind whose fetcher raised is `FetcherFailed`: stale deletion must be skipped
/// for it because its `seen` set is incomplete (`spec.md` §4.C6).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KindOutcome {
    /// FetcherOk means the fetcher exhausted without raising.
    #[default]
    FetcherOk,
    /// FetcherFailed means the fetcher raised partway through.
    FetcherFailed,
}

/// KindRunState is the per-kind slice of [`RunState`], owned exclusively by that
/// kind's pipeline while a run is in progress.
#[derive(Clone, Debug, Default)]
pub struct KindRunState {
    /// Fetched counts raw records yielded by the fetcher.
    pub fetched: u64,
    /// MappedOk counts records that produced an entity.
    pub mapped_ok: u64,
    /// MappedFail counts records that failed mapping (soft-failed or whole-entity).
    pub mapped_fail: u64,
    /// Upserted counts entities successfully upserted.
    pub upserted: u64,
    /// Failed counts entities whose upsert failed after retries were exhausted.
    pub failed: u64,
    /// Deleted counts stale entities removed at the end of the run.
    pub deleted: u64,
    /// Seen is the set of `(blueprint, identifier)` successfully upserted this run;
    /// the basis for stale deletion.
    pub seen: HashSet<EntityKey>,
    /// Outcome records whether this kind's fetcher completed successfully.
    pub outcome: KindOutcome,
    /// Errors holds sampled error messages, capped by the orchestrator.
    pub errors: Vec<ErrorSample>,
}

impl KindRunState {
    /// Record_seen adds `key` to the seen set and bumps the upserted counter.
    pub fn record_seen(&mut self, key: EntityKey) {
        self.seen.insert(key);
        self.upserted = self.upserted.saturating_add(1);
    }

    /// Sample_error appends an error sample, keeping at most `cap` per kind so a
    /// noisy integration does not balloon memory mid-run.
    pub fn sample_error(&mut self, kind: &'static str, message: impl Into<String>, cap: usize) {
        if self.errors.len() < cap {
            self.errors.push(ErrorSample {
                kind,
                message: message.into(),
            });
        }
    }

    /// Is_healthy reports whether this kind finished with no kind-level failure and
    /// no item-level failures.
    pub fn is_healthy(&self) -> bool {
        matches!(self.outcome, KindOutcome::FetcherOk) && self.failed == 0 && self.mapped_fail == 0
    }

    /// Summary snapshots this kind's run-end counters for the orchestrator's
    /// end-of-run log line and the persisted integration-state document
    /// (`spec.md` §7: "a healthy run logs a summary per kind... a degraded
    /// run additionally logs sampled error messages per error kind").
    pub fn summary(&self) -> Summary {
        Summary {
            fetched: self.fetched,
            mapped_ok: self.mapped_ok,
            mapped_fail: self.mapped_fail,
            upserted: self.upserted,
            failed: self.failed,
            deleted: self.deleted,
            errors: self.errors.clone(),
        }
    }
}

/// Summary is a point-in-time snapshot of one kind's run-end counters,
/// detached from the live [`KindRunState`] so a caller can log or persist it
/// without holding the run state itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Fetched counts raw records yielded by the fetcher.
    pub fetched: u64,
    /// MappedOk counts records that produced an entity.
    pub mapped_ok: u64,
    /// MappedFail counts records that failed mapping.
    pub mapped_fail: u64,
    /// Upserted counts entities successfully upserted.
    pub upserted: u64,
    /// Failed counts entities whose upsert failed after retries were exhausted.
    pub failed: u64,
    /// Deleted counts stale entities removed at the end of the run.
    pub deleted: u64,
    /// Errors holds sampled error messages, present only on a degraded run.
    pub errors: Vec<ErrorSample>,
}

/// RunState (S) is the orchestrator-owned, in-memory-only state for a single run:
/// one [`KindRunState`] per configured kind. Created at run start, destroyed at run
/// end.
#[derive(Clone, Debug, Default)]
pub struct RunState {
    /// RunId identifies this run, used in logs and the persisted integration state.
    pub run_id: String,
    /// Kinds holds the per-kind state, keyed by kind name.
    pub kinds: BTreeMap<String, KindRunState>,
}

impl RunState {
    /// New creates an empty run state for the given run id and kind names.
    pub fn new(run_id: impl Into<String>, kinds: impl IntoIterator<Item = String>) -> Self {
        let mut state = Self {
            run_id: run_id.into(),
            kinds: BTreeMap::new(),
        };
        for kind in kinds {
            state.kinds.entry(kind).or_default();
        }
        state
    }

    /// Kind returns a mutable reference to `kind`'s state, creating it if absent.
    pub fn kind_mut(&mut self, kind: &str) -> &mut KindRunState {
        self.kinds.entry(kind.to_string()).or_default()
    }

    /// All_seen returns the union of every kind's seen set.
    pub fn all_seen(&self) -> HashSet<EntityKey> {
        self.kinds
            .values()
            .flat_map(|k| k.seen.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_seen_tracks_key_and_count() {
        let mut s = KindRunState::default();
        s.record_seen(EntityKey::new("service", "a"));
        s.record_seen(EntityKey::new("service", "b"));
        assert_eq!(s.upserted, 2);
        assert!(s.seen.contains(&EntityKey::new("service", "a")));
    }

    #[test]
    fn sample_error_respects_cap() {
        let mut s = KindRunState::default();
        for i in 0..10 {
            s.sample_error("MappingError", format!("err {i}"), 3);
        }
        assert_eq!(s.errors.len(), 3);
    }

    #[test]
    fn is_healthy_requires_fetcher_ok_and_no_failures() {
        let mut s = KindRunState::default();
        assert!(s.is_healthy());
        s.failed = 1;
        assert!(!s.is_healthy());
    }

    #[test]
    fn summary_snapshots_counters_without_the_seen_set() {
        let mut s = KindRunState::default();
        s.record_seen(EntityKey::new("service", "a"));
        s.fetched = 3;
        s.sample_error("MappingError", "bad record", 10);
        let summary = s.summary();
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.upserted, 1);
        assert_eq!(summary.errors.len(), 1);
    }
}
