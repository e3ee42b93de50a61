//! Typed client for the reconciliation REST API.
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::model::{AdsView, Advertiser, LinkRequest, MatchSuggestions, MessageResponse};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Non-2xx answer; `message` is what the server said, verbatim.
    #[error("{message}")]
    Api { status: StatusCode, message: String },
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(err) => err.status(),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Server operations the reconciliation workflow depends on.
#[async_trait]
pub trait AdsApi: Send + Sync {
    async fn ads_view(&self, include_archived: bool) -> ClientResult<AdsView>;

    async fn match_suggestions(&self, external_id: i64) -> ClientResult<MatchSuggestions>;

    async fn link(&self, external_id: i64, request: &LinkRequest) -> ClientResult<MessageResponse>;

    async fn unlink(&self, external_id: i64) -> ClientResult<MessageResponse>;

    async fn archive(&self, external_id: i64) -> ClientResult<MessageResponse>;

    async fn unarchive(&self, external_id: i64) -> ClientResult<MessageResponse>;

    async fn advertisers(&self) -> ClientResult<Vec<Advertiser>>;
}

#[derive(Debug, Clone)]
pub struct HttpAdsClient {
    http: Client,
    base_url: Url,
}

impl HttpAdsClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        // `join` drops the last path segment unless the base ends with '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        let http = Client::builder()
            .user_agent(concat!("adlink/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", path, e)))
    }

    async fn send<T, B>(&self, method: Method, url: Url, body: Option<&B>) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        debug!(%method, %url, "calling ads api");
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let res = request.send().await?;
        let status = res.status();
        let bytes = res.bytes().await?;
        if !status.is_success() {
            return Err(ClientError::Api {
                status,
                message: server_message(status, &bytes),
            });
        }
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn command(&self, external_id: i64, action: &str) -> ClientResult<MessageResponse> {
        let url = self.endpoint(&format!("api/yodeck-media/{}/{}", external_id, action))?;
        self.send::<_, ()>(Method::POST, url, None).await
    }
}

/// Message to show the operator for a failed call: the body's `message`,
/// then its `error`, then the raw text, then the status line.
pub fn server_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                if !text.trim().is_empty() {
                    return text.to_string();
                }
            }
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if !text.is_empty() {
        return text.to_string();
    }
    status
        .canonical_reason()
        .map(|reason| format!("{} {}", status.as_u16(), reason))
        .unwrap_or_else(|| status.as_u16().to_string())
}

#[async_trait]
impl AdsApi for HttpAdsClient {
    async fn ads_view(&self, include_archived: bool) -> ClientResult<AdsView> {
        let mut url = self.endpoint("api/placements/ads-view")?;
        if include_archived {
            url.query_pairs_mut().append_pair("includeArchived", "true");
        }
        self.send::<_, ()>(Method::GET, url, None).await
    }

    async fn match_suggestions(&self, external_id: i64) -> ClientResult<MatchSuggestions> {
        let url = self.endpoint(&format!("api/yodeck-media/{}/match-suggestions", external_id))?;
        self.send::<_, ()>(Method::GET, url, None).await
    }

    async fn link(&self, external_id: i64, request: &LinkRequest) -> ClientResult<MessageResponse> {
        let url = self.endpoint(&format!("api/yodeck-media/{}/link", external_id))?;
        self.send(Method::POST, url, Some(request)).await
    }

    async fn unlink(&self, external_id: i64) -> ClientResult<MessageResponse> {
        self.command(external_id, "unlink").await
    }

    async fn archive(&self, external_id: i64) -> ClientResult<MessageResponse> {
        self.command(external_id, "archive").await
    }

    async fn unarchive(&self, external_id: i64) -> ClientResult<MessageResponse> {
        self.command(external_id, "unarchive").await
    }

    async fn advertisers(&self) -> ClientResult<Vec<Advertiser>> {
        let url = self.endpoint("api/advertisers")?;
        self.send::<_, ()>(Method::GET, url, None).await
    }
}
