//! Page fetcher
//!
//! Issues one GET per page and turns the response into a [`PageResponse`].
//! Bodies are validated here, at the edge: anything that is not a JSON
//! object with an object-valued `data` is rejected as malformed and the
//! error travels up to whoever started the stream.

use super::client::{strip_url, HttpClient};
use super::url_builder::{build_url, redact_url, RequestParams};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// Response Types
// ============================================================================

/// Pagination block of a response body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaginationLinks {
    /// Absolute URL of the next page; absent, null or empty on the last page
    #[serde(rename = "nextURL", default)]
    pub next_url: Option<String>,

    /// Absolute URL of the previous page
    #[serde(rename = "previousURL", default, skip_serializing_if = "Option::is_none")]
    pub previous_url: Option<String>,

    /// Remaining fields, kept verbatim
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// Parsed response body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageBody {
    /// Domain payload: record arrays keyed by resource name
    #[serde(default)]
    pub data: JsonObject,

    /// Cursor links
    #[serde(default)]
    pub pagination: Option<PaginationLinks>,

    /// Remaining top-level fields (status, message, ...)
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl PageBody {
    /// Parse a response body
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::malformed(format!("Response body is not a page object: {e}")))
    }

    /// Next page URL, if there is one
    pub fn next_url(&self) -> Option<&str> {
        self.pagination
            .as_ref()
            .and_then(|p| p.next_url.as_deref())
            .filter(|url| !url.is_empty())
    }

    /// Whether the upstream announced another page
    pub fn has_next(&self) -> bool {
        self.next_url().is_some()
    }

    /// Record array stored under `data.<key>`
    pub fn records(&self, key: &str) -> Option<&Vec<JsonValue>> {
        self.data.get(key).and_then(JsonValue::as_array)
    }
}

/// Transport-level facts about a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMetadata {
    /// Request URL with the credential masked
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// `Content-Type` header, if sent
    pub content_type: Option<String>,
    /// Parameters the page was requested with
    pub request: RequestParams,
}

/// One fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct PageResponse {
    /// Transport metadata
    pub metadata: ResponseMetadata,
    /// Parsed body
    pub body: PageBody,
}

// ============================================================================
// Page Source
// ============================================================================

/// Anything that can fetch one page of an endpoint
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch a single page. Never retries.
    async fn fetch(&self, endpoint: &str, params: &RequestParams) -> Result<PageResponse>;
}

/// [`PageSource`] backed by the upstream HTTP API
#[derive(Debug)]
pub struct HttpPageFetcher {
    client: HttpClient,
    api: ApiConfig,
}

impl HttpPageFetcher {
    /// Create a fetcher for the given API
    pub fn new(client: HttpClient, api: ApiConfig) -> Self {
        Self { client, api }
    }
}

#[async_trait]
impl PageSource for HttpPageFetcher {
    async fn fetch(&self, endpoint: &str, params: &RequestParams) -> Result<PageResponse> {
        let url = build_url(&self.api, endpoint, params)?;
        let shown = redact_url(&url);
        debug!(url = %shown, "Fetching page");

        let response = self.client.get(&url).await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let text = response.text().await.map_err(strip_url)?;
        let body = PageBody::parse(&text)?;

        Ok(PageResponse {
            metadata: ResponseMetadata {
                url: shown,
                status,
                content_type,
                request: *params,
            },
            body,
        })
    }
}
