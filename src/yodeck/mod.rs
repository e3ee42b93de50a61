//! Client for the screen-management platform that owns the media inventory.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::debug;

use crate::config::Yodeck;

pub mod model;

pub use model::{RemoteMedia, RemoteScreen};

/// Read side of the screen-management platform used by the mirror.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn list_media(&self) -> Result<Vec<RemoteMedia>>;

    async fn list_screens(&self) -> Result<Vec<RemoteScreen>>;
}

#[derive(Clone)]
pub struct YodeckClient {
    http: Client,
    base_url: Url,
    label: String,
    token: String,
    page_size: u32,
}

impl fmt::Debug for YodeckClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YodeckClient")
            .field("base_url", &self.base_url)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl YodeckClient {
    pub fn from_config(cfg: &Yodeck) -> Result<Self> {
        let base_url = Url::parse(&cfg.base_url).context("invalid yodeck.base_url")?;
        Self::with_base_url(
            base_url,
            cfg.api_label.clone(),
            cfg.api_token.clone(),
            cfg.page_size,
        )
    }

    pub fn with_base_url(
        base_url: Url,
        label: String,
        token: String,
        page_size: u32,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("adlink/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            label,
            token,
            page_size: page_size.max(1),
        })
    }

    /// `GET {base}/api/v2/{resource}/?limit=&offset=` with the token header.
    pub fn build_request(&self, resource: &str, offset: u64) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(&format!("api/v2/{}/", resource))
            .context("invalid Yodeck base URL")?;
        self.http
            .get(endpoint)
            .query(&[("limit", u64::from(self.page_size)), ("offset", offset)])
            .header("Authorization", format!("Token {}:{}", self.label, self.token))
            .header("Accept", "application/json")
            .build()
            .context("failed to build Yodeck request")
    }

    async fn fetch_all<T: DeserializeOwned>(&self, resource: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut offset = 0u64;
        loop {
            let request = self.build_request(resource, offset)?;
            debug!(url = %request.url(), "fetching yodeck page");
            let res = self
                .http
                .execute(request)
                .await
                .context("failed to reach Yodeck")?;

            if res.status() == StatusCode::TOO_MANY_REQUESTS {
                let body = res.text().await.unwrap_or_default();
                return Err(anyhow!("received 429 from Yodeck: {}", body));
            }
            if !res.status().is_success() {
                let status = res.status();
                let body = res.text().await.unwrap_or_default();
                return Err(anyhow!("yodeck error {} on {}: {}", status, resource, body));
            }

            let page: model::Page<T> = res
                .json()
                .await
                .with_context(|| format!("invalid Yodeck {} response", resource))?;
            let fetched = page.results.len() as u64;
            let has_next = page.next.is_some();
            let count = page.count;
            items.extend(page.results);
            match next_offset(offset, fetched, has_next, count) {
                Some(next) => offset = next,
                None => break,
            }
        }
        Ok(items)
    }
}

/// Offset of the following page, or `None` once the listing is exhausted:
/// no `next` link, an empty page, or `count` items already fetched.
fn next_offset(offset: u64, fetched: u64, has_next: bool, count: Option<i64>) -> Option<u64> {
    let next = offset + fetched;
    let reached_count = count.is_some_and(|total| next >= total.max(0) as u64);
    (has_next && fetched > 0 && !reached_count).then_some(next)
}

#[async_trait]
impl MediaSource for YodeckClient {
    async fn list_media(&self) -> Result<Vec<RemoteMedia>> {
        self.fetch_all("media").await
    }

    async fn list_screens(&self) -> Result<Vec<RemoteScreen>> {
        self.fetch_all("screens").await
    }
}
