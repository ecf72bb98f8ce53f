use std::sync::Arc;

use ocean_config::CompiledPac;
use ocean_mapping::ResolutionPolicy;
use ocean_port_client::PortClient;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::gate::KeyedGate;

/// Context is the per-run immutable snapshot threaded into every fetcher and
/// webhook processor: the compiled config, a handle to the Port client, and
/// the run-level search-resolution policy. Grounded on the teacher's
/// `Context`/`Request` split (`controller/src/lib.rs`): `Context` never
/// changes mid-run, `RunHandle` carries the things that do (the run id, its
/// span, its cancellation signal).
///
/// `Context` is built once per process and shared (via `Arc`) across every
/// resync run and the whole webhook surface's lifetime, so `gate` is a
/// single registry both paths actually contend on, not a per-run one.
pub struct Context {
    /// Pac is the compiled PAC snapshot this run was started with. A
    /// hot-reload during the run does not mutate it; the next run picks up
    /// the newer snapshot.
    pub pac: Arc<CompiledPac>,
    /// Port is the shared Port client, reused across every kind and webhook.
    pub port: Arc<PortClient>,
    /// Policy is the run-level search-identifier resolution mode.
    pub policy: ResolutionPolicy,
    /// Gate serializes resync upserts against webhook deliveries for the
    /// same entity key (`spec.md` §9, webhook/resync ordering strategy (a)).
    pub gate: KeyedGate,
}

impl Context {
    /// New builds a context from a compiled PAC snapshot and a Port client.
    pub fn new(pac: Arc<CompiledPac>, port: Arc<PortClient>, policy: ResolutionPolicy) -> Self {
        Self {
            pac,
            port,
            policy,
            gate: KeyedGate::new(),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("kinds", &self.pac.resources.len())
            .field("policy", &self.policy)
            .finish()
    }
}

/// RunHandle carries per-run identity and control: the run id (used in logs
/// and the persisted integration state), and the cancellation signal every
/// task observes.
#[derive(Clone)]
pub struct RunHandle {
    /// RunId identifies this run.
    pub run_id: String,
    /// Cancel fires when the run should stop: operator shutdown, a wall-clock
    /// budget expiring, or an unrecoverable startup failure.
    pub cancel: CancellationToken,
}

impl RunHandle {
    /// New mints a run handle with a fresh run id.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            cancel,
        }
    }

    /// Child derives a child cancellation token scoped to one kind or
    /// processor, so cancelling it does not cancel the whole run.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }
}
