use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::PortClientError;

#[derive(Deserialize)]
struct AccessTokenResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
}

/// TokenAuth exchanges `port.clientId`/`port.clientSecret` for a bearer token and
/// caches it, refreshing on the client's observed 401.
pub(crate) struct TokenAuth {
    base_url: String,
    client_id: String,
    client_secret: String,
    cached: RwLock<Option<String>>,
}

impl TokenAuth {
    pub(crate) fn new(base_url: String, client_id: String, client_secret: String) -> Self {
        Self {
            base_url,
            client_id,
            client_secret,
            cached: RwLock::new(None),
        }
    }

    /// Token returns a cached bearer token, fetching one if none is cached.
    pub(crate) async fn token(&self, http: &reqwest::Client) -> Result<String, PortClientError> {
        if let Some(token) = self.cached.read().clone() {
            return Ok(token);
        }
        self.refresh(http).await
    }

    /// Invalidate drops the cached token, forcing the next call to re-authenticate.
    pub(crate) fn invalidate(&self) {
        *self.cached.write() = None;
    }

    async fn refresh(&self, http: &reqwest::Client) -> Result<String, PortClientError> {
        let url = format!("{}/v1/auth/access_token", self.base_url.trim_end_matches('/'));
        let res = http
            .post(url)
            .json(&serde_json::json!({
                "clientId": self.client_id,
                "clientSecret": self.client_secret,
            }))
            .send()
            .await
            .map_err(|e| PortClientError::Transient {
                detail: e.to_string(),
                attempts: 1,
            })?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(if status == reqwest::StatusCode::UNAUTHORIZED {
                PortClientError::Auth(body)
            } else {
                PortClientError::from_status(status, body)
            });
        }

        let parsed: AccessTokenResponse = res.json().await?;
        *self.cached.write() = Some(parsed.access_token.clone());
        Ok(parsed.access_token)
    }
}
