/// PortClientError is the typed error surface for every Port API call, matching
/// the error kinds the runtime distinguishes retry behavior on.
#[derive(thiserror::Error, Debug)]
pub enum PortClientError {
    /// Auth indicates Port rejected the client's credentials; fatal for the
    /// component, the run aborts.
    #[error("authentication rejected: {0}")]
    Auth(String),
    /// Transient indicates a 5xx, network timeout, or 429; retried with backoff
    /// and surfaced only after attempts are exhausted.
    #[error("transient remote error after {attempts} attempt(s): {detail}")]
    Transient {
        /// Detail describes the underlying failure.
        detail: String,
        /// Attempts is how many attempts were made before giving up.
        attempts: u32,
    },
    /// Permanent indicates a 4xx other than 429/401; not retried, surfaced as a
    /// per-item failure.
    #[error("permanent remote error ({status}): {detail}")]
    Permanent {
        /// Status is the HTTP status code Port returned.
        status: u16,
        /// Detail describes the response body, if any.
        detail: String,
    },
    /// Decode indicates a successful response body could not be parsed.
    #[error("decoding response: {0}")]
    Decode(#[from] serde_json::Error),
    /// Http indicates the transport itself failed (DNS, connect, TLS, body read)
    /// before a status code could be classified.
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PortClientError {
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            Self::Auth(body)
        } else {
            Self::Permanent {
                status: status.as_u16(),
                detail: body,
            }
        }
    }
}
