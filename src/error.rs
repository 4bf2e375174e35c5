use crate::portal::panels::PanelsError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The initial navigation request failed, so there is no session to crawl with
    #[error("failed to establish a portal session via {url}")]
    Session {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// Retries were exhausted for a transient failure
    #[error("request to {url} failed after {attempts} attempt(s)")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    /// The portal answered, but not with the expected panel container
    #[error("unexpected navigation response from {url}")]
    Navigation {
        url: String,
        #[source]
        source: PanelsError,
    },
    #[error("crawl was cancelled")]
    Cancelled,
    #[error("crawl task ended without reporting")]
    Aborted,
    #[error("invalid date format {0:?}")]
    DateFormat(String),
    #[error("invalid portal url")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub(crate) fn is_transient_request_error(e: &reqwest::Error) -> bool {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        return true;
    }
    e.status().is_some_and(|s| s.is_server_error())
}
