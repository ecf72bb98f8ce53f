use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use ocean_mapping::{ResolverError, SearchResolver};
use ocean_model::{Entity, EntityKey, SearchIdentifier};
use rand::Rng;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{instrument, warn};

use crate::auth::TokenAuth;
use crate::error::PortClientError;
use crate::ratelimit::RateLimiter;

const BACKOFF_MS: [u64; 7] = [200, 400, 800, 1600, 3200, 6400, 12800];

/// PortClientConfig is the subset of `port.*` configuration settings needed to
/// construct a [`PortClient`].
#[derive(Clone, Debug)]
pub struct PortClientConfig {
    /// BaseUrl is the Port API base URL, e.g. `https://api.getport.io`.
    pub base_url: String,
    /// ClientId authenticates the integration.
    pub client_id: String,
    /// ClientSecret authenticates the integration.
    pub client_secret: String,
    /// IntegrationIdentifier scopes stale-deletion to entities this integration
    /// created.
    pub integration_identifier: String,
    /// MaxAttempts bounds retries of transient failures.
    pub max_attempts: u32,
    /// InitialConcurrency is the starting number of in-flight requests allowed.
    pub initial_concurrency: usize,
    /// MinConcurrency is the floor the rate limiter will narrow to.
    pub min_concurrency: usize,
    /// MaxConcurrency is the ceiling the rate limiter will widen to.
    pub max_concurrency: usize,
}

/// UpsertOutcome is one entity's result from a call to [`PortClient::upsert_batch`].
#[derive(Debug)]
pub struct UpsertOutcome {
    /// Key identifies the entity this outcome is for.
    pub key: EntityKey,
    /// Result is `Ok` if the upsert succeeded.
    pub result: Result<(), PortClientError>,
}

/// DeleteOutcome is the result of [`PortClient::delete`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Deleted means Port removed the entity.
    Deleted,
    /// NotFound means the entity was already absent; treated as success
    /// (`spec.md` §4.C2, Deletion semantics).
    NotFound,
}

/// KindIntegrationState is one kind's slice of the persisted integration state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindIntegrationState {
    /// SeenSummary is an opaque summary of the run's seen set (e.g. a bloom
    /// filter digest), too large to persist verbatim.
    #[serde(default)]
    pub seen_summary: String,
    /// LastSuccessTs is when this kind last finished with no fetcher failure.
    #[serde(default)]
    pub last_success_ts: Option<chrono::DateTime<chrono::Utc>>,
    /// Counters mirrors the kind's `KindRunState` counters for observability.
    #[serde(default)]
    pub counters: BTreeMap<String, u64>,
}

/// IntegrationState is the document persisted under Port between runs
/// (`spec.md` §6, Persisted state).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationState {
    /// LastRunId is the most recent run's identifier.
    pub last_run_id: String,
    /// LastSuccessTimestamp is when the run last finished without a run-level
    /// failure.
    pub last_success_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    /// PerKind holds each kind's state, keyed by kind name.
    #[serde(default)]
    pub per_kind: BTreeMap<String, KindIntegrationState>,
}

/// PortClient is the runtime's only HTTP surface to the Port catalog.
pub struct PortClient {
    http: reqwest::Client,
    auth: TokenAuth,
    base_url: String,
    integration_identifier: String,
    limiter: RateLimiter,
    max_attempts: u32,
}

enum Attempt<T> {
    Done(T),
    Retry {
        err: PortClientError,
        after: Option<Duration>,
    },
    Fatal(PortClientError),
}

impl PortClient {
    /// New builds a client from `cfg`, ready to authenticate lazily on first use.
    pub fn new(cfg: PortClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth: TokenAuth::new(
                cfg.base_url.clone(),
                cfg.client_id,
                cfg.client_secret,
            ),
            base_url: cfg.base_url,
            integration_identifier: cfg.integration_identifier,
            limiter: RateLimiter::new(
                cfg.initial_concurrency,
                cfg.min_concurrency,
                cfg.max_concurrency,
            ),
            max_attempts: cfg.max_attempts.max(1),
        }
    }

    /// Upsert_batch sends every entity in `entities` in one Port bulk-upsert call,
    /// reporting a per-entity outcome so the caller learns which keys succeeded.
    #[instrument(skip_all, fields(count = entities.len()))]
    pub async fn upsert_batch(&self, blueprint: &str, entities: Vec<Entity>) -> Vec<UpsertOutcome> {
        let keys: Vec<EntityKey> = entities.iter().map(Entity::key).collect();
        let path = format!("v1/blueprints/{blueprint}/entities/bulk");
        let body = serde_json::json!({ "entities": entities });

        let result = self
            .execute_with_retry(|| {
                let body = body.clone();
                let path = path.clone();
                async move { self.request::<Value>(reqwest::Method::POST, &path, Some(body)).await }
            })
            .await;

        match result {
            Ok(_) => keys
                .into_iter()
                .map(|key| UpsertOutcome {
                    key,
                    result: Ok(()),
                })
                .collect(),
            Err(e) => keys
                .into_iter()
                .map(|key| UpsertOutcome {
                    key,
                    result: Err(clone_error(&e)),
                })
                .collect(),
        }
    }

    /// Delete removes the entity identified by `key`. A missing entity is
    /// reported as [`DeleteOutcome::NotFound`], not an error.
    #[instrument(skip_all, fields(%key))]
    pub async fn delete(&self, key: &EntityKey) -> Result<DeleteOutcome, PortClientError> {
        let path = format!(
            "v1/blueprints/{}/entities/{}",
            key.blueprint, key.identifier
        );
        match self
            .execute_with_retry(|| self.request::<Value>(reqwest::Method::DELETE, &path, None))
            .await
        {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(PortClientError::Permanent { status, .. }) if status == 404 => {
                Ok(DeleteOutcome::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// Search resolves `query` (a Port search-rules document) against `blueprint`,
    /// returning every matching entity identifier.
    #[instrument(skip_all, fields(blueprint))]
    pub async fn search(&self, blueprint: &str, query: Value) -> Result<Vec<String>, PortClientError> {
        #[derive(Deserialize)]
        struct SearchResponse {
            entities: Vec<SearchedEntity>,
        }
        #[derive(Deserialize)]
        struct SearchedEntity {
            identifier: String,
        }

        let path = format!("v1/blueprints/{blueprint}/entities/search");
        let res: SearchResponse = self
            .execute_with_retry(|| self.request(reqwest::Method::POST, &path, Some(query.clone())))
            .await?;
        Ok(res.entities.into_iter().map(|e| e.identifier).collect())
    }

    /// Set_integration_state persists `state` under Port. Called only once, at
    /// run end, by the resync orchestrator.
    pub async fn set_integration_state(&self, state: &IntegrationState) -> Result<(), PortClientError> {
        let path = format!(
            "v1/integration/{}/state",
            self.integration_identifier
        );
        let body = serde_json::to_value(state)?;
        self.execute_with_retry(|| self.request::<Value>(reqwest::Method::PUT, &path, Some(body.clone())))
            .await?;
        Ok(())
    }

    /// Get_integration_state fetches the previously persisted state, if any.
    pub async fn get_integration_state(&self) -> Result<Option<IntegrationState>, PortClientError> {
        let path = format!(
            "v1/integration/{}/state",
            self.integration_identifier
        );
        match self
            .execute_with_retry(|| self.request::<IntegrationState>(reqwest::Method::GET, &path, None))
            .await
        {
            Ok(state) => Ok(Some(state)),
            Err(PortClientError::Permanent { status, .. }) if status == 404 => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Ensure_blueprint upserts a blueprint definition. Only called at startup,
    /// when `initializePortResources` is set.
    pub async fn ensure_blueprint(&self, blueprint: &Value) -> Result<(), PortClientError> {
        self.execute_with_retry(|| {
            self.request::<Value>(reqwest::Method::POST, "v1/blueprints", Some(blueprint.clone()))
        })
        .await?;
        Ok(())
    }

    /// Ensure_scorecards upserts every scorecard document. Only called at
    /// startup, when `initializePortResources` is set.
    pub async fn ensure_scorecards(&self, blueprint: &str, scorecards: &[Value]) -> Result<(), PortClientError> {
        let path = format!("v1/blueprints/{blueprint}/scorecards");
        for scorecard in scorecards {
            self.execute_with_retry(|| {
                self.request::<Value>(reqwest::Method::POST, &path, Some(scorecard.clone()))
            })
            .await?;
        }
        Ok(())
    }

    async fn execute_with_retry<F, Fut, T>(&self, mut attempt: F) -> Result<T, PortClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            let _permit = self.limiter.acquire().await;
            match attempt().await {
                Attempt::Done(value) => {
                    self.limiter.on_success();
                    return Ok(value);
                }
                Attempt::Fatal(err) => return Err(err),
                Attempt::Retry { err, after } => {
                    self.limiter.on_throttled();
                    if attempts >= self.max_attempts {
                        return Err(reattempt_count(err, attempts));
                    }
                    let delay = after.unwrap_or_else(|| backoff_with_jitter(attempts));
                    warn!(attempts, delay_ms = delay.as_millis() as u64, "retrying after transient Port error");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn request<T>(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Attempt<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let token = match self.auth.token(&self.http).await {
            Ok(t) => t,
            Err(e) => return Attempt::Fatal(e),
        };

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let mut req = self.http.request(method, url).bearer_auth(&token);
        if let Some(body) = &body {
            req = req.json(body);
        }

        let res = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                return Attempt::Retry {
                    err: PortClientError::Transient {
                        detail: e.to_string(),
                        attempts: 0,
                    },
                    after: None,
                }
            }
        };

        let status = res.status();
        if status.is_success() {
            return match res.json::<T>().await {
                Ok(value) => Attempt::Done(value),
                Err(e) => Attempt::Fatal(PortClientError::Http(e)),
            };
        }

        let retry_after = parse_retry_after(res.headers());
        let body_text = res.text().await.unwrap_or_default();

        if status == StatusCode::UNAUTHORIZED {
            self.auth.invalidate();
            return Attempt::Retry {
                err: PortClientError::Auth(body_text),
                after: None,
            };
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::Retry {
                err: PortClientError::Transient {
                    detail: format!("{status}: {body_text}"),
                    attempts: 0,
                },
                after: retry_after,
            };
        }
        Attempt::Fatal(PortClientError::from_status(status, body_text))
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    raw.parse::<u64>().ok().map(Duration::from_secs)
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let idx = usize::try_from(attempt.min(6)).unwrap_or(6);
    let base_ms = BACKOFF_MS[idx];
    let jitter_ms = rand::thread_rng().gen_range(0..base_ms.max(1));
    Duration::from_millis(base_ms.saturating_add(jitter_ms))
}

fn reattempt_count(err: PortClientError, attempts: u32) -> PortClientError {
    match err {
        PortClientError::Transient { detail, .. } => PortClientError::Transient { detail, attempts },
        other => other,
    }
}

fn clone_error(err: &PortClientError) -> PortClientError {
    match err {
        PortClientError::Auth(s) => PortClientError::Auth(s.clone()),
        PortClientError::Transient { detail, attempts } => PortClientError::Transient {
            detail: detail.clone(),
            attempts: *attempts,
        },
        PortClientError::Permanent { status, detail } => PortClientError::Permanent {
            status: *status,
            detail: detail.clone(),
        },
        PortClientError::Decode(e) => PortClientError::Permanent {
            status: 0,
            detail: e.to_string(),
        },
        PortClientError::Http(e) => PortClientError::Permanent {
            status: 0,
            detail: e.to_string(),
        },
    }
}

#[async_trait]
impl SearchResolver for PortClient {
    async fn resolve(&self, search: &SearchIdentifier) -> Result<Vec<String>, ResolverError> {
        let query = serde_json::json!({
            "combinator": search.combinator,
            "rules": search.rules,
        });
        self.search(&search.target_blueprint, query)
            .await
            .map_err(|e| ResolverError::Backend(e.to_string()))
    }
}
