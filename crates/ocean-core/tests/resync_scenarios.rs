//! Exercises the resync orchestrator end to end against a `wiremock`-mocked
//! Port API: cold start upserts (Scenario A, `spec.md` §8) and cross-run
//! stale deletion (Scenario B).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use ocean_core::{Context, Fetcher, FetcherError, Orchestrator, PipelineOptions, RunHandle, RunOutcome};
use ocean_mapping::ResolutionPolicy;
use ocean_model::{Blueprint, EntityMapping, PortAppConfig, PortMapping, RawRecord, ResourceConfig};
use ocean_port_client::{PortClient, PortClientConfig};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// SequencedFetcher replays one batch of records per call to
/// [`Fetcher::fetch`], popped off a queue set up ahead of time; successive
/// orchestrator runs against the same fetcher instance see successive
/// entries, so a test can simulate "yesterday's data" then "today's data".
struct SequencedFetcher {
    runs: Mutex<VecDeque<Vec<serde_json::Value>>>,
}

impl SequencedFetcher {
    fn new(runs: Vec<Vec<serde_json::Value>>) -> Self {
        Self {
            runs: Mutex::new(runs.into_iter().collect()),
        }
    }
}

impl Fetcher for SequencedFetcher {
    fn fetch(&self, _ctx: Arc<Context>) -> BoxStream<'static, Result<Vec<RawRecord>, FetcherError>> {
        let records = self.runs.lock().unwrap().pop_front().unwrap_or_default();
        let batch: Vec<RawRecord> = records.into_iter().map(RawRecord::new).collect();
        stream::once(async move { Ok(batch) }).boxed()
    }
}

fn project_resource() -> ResourceConfig {
    ResourceConfig {
        kind: "project".to_string(),
        port: PortMapping {
            entity: EntityMapping {
                identifier: ".id".to_string(),
                blueprint: "project".to_string(),
                ..Default::default()
            },
        },
        ..Default::default()
    }
}

fn issue_resource() -> ResourceConfig {
    let mut relations = BTreeMap::new();
    relations.insert("project".to_string(), ".projectId".to_string());
    ResourceConfig {
        kind: "issue".to_string(),
        port: PortMapping {
            entity: EntityMapping {
                identifier: ".id".to_string(),
                blueprint: "issue".to_string(),
                relations,
                ..Default::default()
            },
        },
        ..Default::default()
    }
}

fn blueprints() -> BTreeMap<String, Blueprint> {
    let mut issue_relations = BTreeMap::new();
    issue_relations.insert("project".to_string(), "project".to_string());
    BTreeMap::from([
        (
            "project".to_string(),
            Blueprint {
                identifier: "project".to_string(),
                relations: BTreeMap::new(),
            },
        ),
        (
            "issue".to_string(),
            Blueprint {
                identifier: "issue".to_string(),
                relations: issue_relations,
            },
        ),
    ])
}

async fn mock_port(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/auth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "test-token"})))
        .mount(server)
        .await;
    for kind in ["project", "issue"] {
        Mock::given(method("POST"))
            .and(path(format!("/v1/blueprints/{kind}/entities/bulk")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(server)
            .await;
    }
    Mock::given(method("PUT"))
        .and(path("/v1/integration/test-integration/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
}

fn port_client(base_url: String) -> Arc<PortClient> {
    Arc::new(PortClient::new(PortClientConfig {
        base_url,
        client_id: "id".to_string(),
        client_secret: "secret".to_string(),
        integration_identifier: "test-integration".to_string(),
        max_attempts: 3,
        initial_concurrency: 4,
        min_concurrency: 1,
        max_concurrency: 8,
    }))
}

fn pac() -> Arc<ocean_config::CompiledPac> {
    let pac = PortAppConfig {
        resources: vec![project_resource(), issue_resource()],
        ..Default::default()
    };
    Arc::new(ocean_config::compile(&pac))
}

fn pac_with_delete_dependent_entities() -> Arc<ocean_config::CompiledPac> {
    let pac = PortAppConfig {
        resources: vec![project_resource(), issue_resource()],
        delete_dependent_entities: true,
        ..Default::default()
    };
    Arc::new(ocean_config::compile(&pac))
}

fn projects() -> Vec<serde_json::Value> {
    vec![json!({"id": "A"}), json!({"id": "B"}), json!({"id": "C"})]
}

fn issues_with(ids: &[&str]) -> Vec<serde_json::Value> {
    let owners = [("1", "A"), ("2", "A"), ("3", "B"), ("4", "B"), ("5", "C")];
    owners
        .iter()
        .filter(|(id, _)| ids.contains(id))
        .map(|(id, project)| json!({"id": id, "projectId": project}))
        .collect()
}

/// Scenario A (`spec.md` §8): cold start, no webhooks. Two kinds, a fetcher
/// per kind, no prior seen state. Expect every record to upsert successfully
/// and zero deletions.
#[tokio::test]
async fn scenario_a_cold_start_upserts_every_record() {
    let server = MockServer::start().await;
    mock_port(&server).await;
    let port = port_client(server.uri());

    let mut fetchers: HashMap<String, Arc<dyn Fetcher>> = HashMap::new();
    fetchers.insert(
        "project".to_string(),
        Arc::new(SequencedFetcher::new(vec![projects()])),
    );
    fetchers.insert(
        "issue".to_string(),
        Arc::new(SequencedFetcher::new(vec![issues_with(&["1", "2", "3", "4", "5"])])),
    );

    let pac = pac();
    let orchestrator = Orchestrator::new(
        pac.clone(),
        port.clone(),
        blueprints(),
        fetchers,
        PipelineOptions::default(),
        Duration::from_secs(30),
    );
    let ctx = Arc::new(Context::new(pac, port, ResolutionPolicy::Strict));
    let handle = RunHandle::new(CancellationToken::new());

    let (outcome, state) = orchestrator.run(ctx, handle).await.expect("run succeeds");

    assert_eq!(outcome, RunOutcome::Succeeded);
    assert_eq!(state.all_seen().len(), 8);
    assert_eq!(state.kinds["project"].upserted, 3);
    assert_eq!(state.kinds["issue"].upserted, 5);
    assert_eq!(state.kinds["project"].deleted, 0);
    assert_eq!(state.kinds["issue"].deleted, 0);
}

/// Scenario B (`spec.md` §8): stale deletion. The same orchestrator instance
/// runs twice; the second run's `issue` fetcher omits `issue#5`, which the
/// first run saw. Expect exactly one deletion, of `issue#5`, and idempotent
/// upserts for everything still present.
#[tokio::test]
async fn scenario_b_second_run_deletes_stale_entity() {
    let server = MockServer::start().await;
    mock_port(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/v1/blueprints/issue/entities/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    let port = port_client(server.uri());
    let pac = pac();

    let mut fetchers: HashMap<String, Arc<dyn Fetcher>> = HashMap::new();
    fetchers.insert(
        "project".to_string(),
        Arc::new(SequencedFetcher::new(vec![projects(), projects()])),
    );
    fetchers.insert(
        "issue".to_string(),
        Arc::new(SequencedFetcher::new(vec![
            issues_with(&["1", "2", "3", "4", "5"]),
            issues_with(&["1", "2", "3", "4"]),
        ])),
    );

    let orchestrator = Orchestrator::new(
        pac.clone(),
        port.clone(),
        blueprints(),
        fetchers,
        PipelineOptions::default(),
        Duration::from_secs(30),
    );
    let ctx = Arc::new(Context::new(pac, port, ResolutionPolicy::Strict));

    let (first_outcome, _) = orchestrator
        .run(ctx.clone(), RunHandle::new(CancellationToken::new()))
        .await
        .expect("first run succeeds");
    assert_eq!(first_outcome, RunOutcome::Succeeded);

    let (second_outcome, second_state) = orchestrator
        .run(ctx, RunHandle::new(CancellationToken::new()))
        .await
        .expect("second run succeeds");

    assert_eq!(second_outcome, RunOutcome::Succeeded);
    assert_eq!(second_state.kinds["issue"].deleted, 1);
    assert_eq!(second_state.kinds["project"].deleted, 0);
    assert_eq!(second_state.all_seen().len(), 7);
}

/// A fetch batch that (re-)emits the same identifier twice within a single
/// run must fold into one upsert, not two (`spec.md` §3, `enableMergeEntity`).
#[tokio::test]
async fn scenario_duplicate_identifier_within_a_run_is_merged_not_double_upserted() {
    let server = MockServer::start().await;
    mock_port(&server).await;
    let port = port_client(server.uri());

    let mut fetchers: HashMap<String, Arc<dyn Fetcher>> = HashMap::new();
    fetchers.insert(
        "project".to_string(),
        Arc::new(SequencedFetcher::new(vec![vec![json!({"id": "A"}), json!({"id": "A"})]])),
    );
    fetchers.insert("issue".to_string(), Arc::new(SequencedFetcher::new(vec![vec![]])));

    let pac = pac();
    let orchestrator = Orchestrator::new(
        pac.clone(),
        port.clone(),
        blueprints(),
        fetchers,
        PipelineOptions::default(),
        Duration::from_secs(30),
    );
    let ctx = Arc::new(Context::new(pac, port, ResolutionPolicy::Strict));
    let handle = RunHandle::new(CancellationToken::new());

    let (outcome, state) = orchestrator.run(ctx, handle).await.expect("run succeeds");

    assert_eq!(outcome, RunOutcome::Succeeded);
    assert_eq!(state.kinds["project"].mapped_ok, 2);
    assert_eq!(state.kinds["project"].upserted, 1);
    assert_eq!(state.all_seen().len(), 1);
}

/// OrderRecorder is a `wiremock` responder that appends `label` to a shared
/// log every time it answers a request, letting a test assert on the
/// relative order two distinct mocked endpoints were hit in.
struct OrderRecorder {
    order: Arc<Mutex<Vec<String>>>,
    label: String,
}

impl Respond for OrderRecorder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.order.lock().unwrap().push(self.label.clone());
        ResponseTemplate::new(200).set_body_json(json!({}))
    }
}

/// When `deleteDependentEntities` is set, stale deletes run leaves-first:
/// `issue` (nothing depends on it) is deleted before `project` (`issue`'s
/// dependency), since the remote catalog may reject deleting an entity
/// something else still references (`spec.md` §9).
#[tokio::test]
async fn scenario_delete_dependent_entities_orders_deletes_leaves_first() {
    let server = MockServer::start().await;
    mock_port(&server).await;
    let order = Arc::new(Mutex::new(Vec::new()));
    Mock::given(method("DELETE"))
        .and(path("/v1/blueprints/issue/entities/5"))
        .respond_with(OrderRecorder {
            order: order.clone(),
            label: "issue".to_string(),
        })
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/blueprints/project/entities/C"))
        .respond_with(OrderRecorder {
            order: order.clone(),
            label: "project".to_string(),
        })
        .mount(&server)
        .await;
    let port = port_client(server.uri());
    let pac = pac_with_delete_dependent_entities();

    let mut fetchers: HashMap<String, Arc<dyn Fetcher>> = HashMap::new();
    fetchers.insert(
        "project".to_string(),
        Arc::new(SequencedFetcher::new(vec![
            projects(),
            vec![json!({"id": "A"}), json!({"id": "B"})],
        ])),
    );
    fetchers.insert(
        "issue".to_string(),
        Arc::new(SequencedFetcher::new(vec![
            issues_with(&["1", "2", "3", "4", "5"]),
            issues_with(&["1", "2", "3", "4"]),
        ])),
    );

    let orchestrator = Orchestrator::new(
        pac.clone(),
        port.clone(),
        blueprints(),
        fetchers,
        PipelineOptions::default(),
        Duration::from_secs(30),
    );
    let ctx = Arc::new(Context::new(pac, port, ResolutionPolicy::Strict));

    orchestrator
        .run(ctx.clone(), RunHandle::new(CancellationToken::new()))
        .await
        .expect("first run succeeds");
    let (second_outcome, second_state) = orchestrator
        .run(ctx, RunHandle::new(CancellationToken::new()))
        .await
        .expect("second run succeeds");

    assert_eq!(second_outcome, RunOutcome::Succeeded);
    assert_eq!(second_state.kinds["issue"].deleted, 1);
    assert_eq!(second_state.kinds["project"].deleted, 1);
    assert_eq!(*order.lock().unwrap(), vec!["issue".to_string(), "project".to_string()]);
}
