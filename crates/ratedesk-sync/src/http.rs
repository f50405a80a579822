//! HTTP client for the pricing backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server {
        status: u16,
        body: String,
        parsed: Option<ErrorBody>,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackendError {
    /// Build a server error, parsing the structured error body when present.
    pub fn server(status: u16, body: String) -> Self {
        let parsed = serde_json::from_str::<ErrorBody>(&body).ok();
        BackendError::Server {
            status,
            body,
            parsed,
        }
    }

    /// Error messages reported by the server, in order. Empty when the
    /// response carried no structured `errors` field.
    pub fn server_errors(&self) -> Vec<String> {
        match self {
            BackendError::Server {
                parsed: Some(body), ..
            } => body.errors(),
            _ => Vec::new(),
        }
    }

    /// The server's top-level `message`, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            BackendError::Server {
                parsed: Some(body), ..
            } => body.message.as_deref(),
            _ => None,
        }
    }
}

/// Error body returned by the backend on 4xx/5xx.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub errors: Option<ErrorList>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn errors(&self) -> Vec<String> {
        match &self.errors {
            Some(ErrorList::Many(list)) => list.clone(),
            Some(ErrorList::One(one)) => vec![one.clone()],
            None => Vec::new(),
        }
    }
}

/// `errors` is either a list of messages or a single message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ErrorList {
    Many(Vec<String>),
    One(String),
}

/// The one call the coordinator needs: POST a JSON body to a path.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn post(&self, path: &str, body: &Value) -> Result<(), BackendError>;
}

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// reqwest-backed [`Backend`].
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpBackend {
    /// Create a client for the given backend.
    ///
    /// `base_url` should be like `http://localhost:8000/api` (a trailing slash
    /// is trimmed).
    pub fn new(config: ClientConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn post(&self, path: &str, body: &Value) -> Result<(), BackendError> {
        let url = self.url(path);
        info!(url = %url, "posting to pricing backend");

        let mut req = self.client.post(&url).json(body);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(url = %url, status = status.as_u16(), "backend rejected request");
            return Err(BackendError::server(status.as_u16(), body));
        }
        info!(url = %url, status = status.as_u16(), "backend accepted request");
        Ok(())
    }
}
