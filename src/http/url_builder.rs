//! Request URL construction and cursor extraction
//!
//! The upstream takes every parameter in the query string:
//!
//! ```text
//! <base>/<endpoint>?api_key=<key>&limit=<n>[&page_after=<c>|&page_before=<c>]
//! ```
//!
//! Its responses point at the next page with an absolute `nextURL`; we only
//! take the cursor out of it and rebuild the request ourselves, so the
//! credential and limit always come from our own configuration.

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use std::fmt;
use std::num::NonZeroU32;
use url::Url;

/// Query parameter carrying the credential
pub const API_KEY_PARAM: &str = "api_key";
/// Query parameter carrying the page size
pub const LIMIT_PARAM: &str = "limit";
/// Query parameter for forward pagination
pub const PAGE_AFTER_PARAM: &str = "page_after";
/// Query parameter for backward pagination
pub const PAGE_BEFORE_PARAM: &str = "page_before";

/// Position in the cursor chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageCursor {
    /// Records after this id
    After(i64),
    /// Records before this id
    Before(i64),
}

impl PageCursor {
    /// Raw cursor value
    pub fn value(self) -> i64 {
        match self {
            Self::After(v) | Self::Before(v) => v,
        }
    }

    /// Query parameter name for this cursor
    pub fn param(self) -> &'static str {
        match self {
            Self::After(_) => PAGE_AFTER_PARAM,
            Self::Before(_) => PAGE_BEFORE_PARAM,
        }
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.param(), self.value())
    }
}

/// Parameters of one page request
///
/// A request carries at most one cursor, and the limit is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestParams {
    limit: NonZeroU32,
    cursor: Option<PageCursor>,
}

impl RequestParams {
    /// Request for the first page
    pub fn new(limit: NonZeroU32) -> Self {
        Self {
            limit,
            cursor: None,
        }
    }

    /// Request for the page after `cursor`
    pub fn after(limit: NonZeroU32, cursor: i64) -> Self {
        Self::new(limit).with_cursor(PageCursor::After(cursor))
    }

    /// Request for the page before `cursor`
    pub fn before(limit: NonZeroU32, cursor: i64) -> Self {
        Self::new(limit).with_cursor(PageCursor::Before(cursor))
    }

    /// Replace the cursor
    #[must_use]
    pub fn with_cursor(mut self, cursor: PageCursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Page size
    pub fn limit(&self) -> u32 {
        self.limit.get()
    }

    /// Cursor, if any
    pub fn cursor(&self) -> Option<PageCursor> {
        self.cursor
    }

    /// `page_after` value, if set
    pub fn page_after(&self) -> Option<i64> {
        match self.cursor {
            Some(PageCursor::After(v)) => Some(v),
            _ => None,
        }
    }

    /// `page_before` value, if set
    pub fn page_before(&self) -> Option<i64> {
        match self.cursor {
            Some(PageCursor::Before(v)) => Some(v),
            _ => None,
        }
    }
}

/// Build the absolute URL for one page of `endpoint`
///
/// The base loses its trailing slashes and the endpoint its leading ones, so
/// `https://api/v1/` + `/trees` becomes `https://api/v1/trees`.
pub fn build_url(api: &ApiConfig, endpoint: &str, params: &RequestParams) -> Result<Url> {
    let base = api.base_url.trim_end_matches('/');
    let path = endpoint.trim_start_matches('/');
    let mut url = Url::parse(&format!("{base}/{path}"))?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair(API_KEY_PARAM, &api.api_key);
        query.append_pair(LIMIT_PARAM, &params.limit().to_string());
        if let Some(cursor) = params.cursor() {
            query.append_pair(cursor.param(), &cursor.value().to_string());
        }
    }

    Ok(url)
}

/// Render a URL with the credential masked, for logs
pub fn redact_url(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == API_KEY_PARAM) {
        return url.to_string();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == API_KEY_PARAM {
                "***".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();

    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

/// Decoded value of the query parameter `name` in `url`
///
/// Works on absolute and relative URLs alike. `+` decodes to a space.
/// Returns `None` if the parameter is absent or has an empty value.
pub fn extract_query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();

    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Cursor embedded in a `nextURL`
///
/// `page_after` wins when both cursors are present. Error messages quote the
/// URL with its credential masked.
pub fn cursor_from_next_url(next_url: &str) -> Result<PageCursor> {
    let parse = |name: &str, raw: String| {
        raw.trim().parse::<i64>().map_err(|_| {
            Error::malformed(format!(
                "nextURL has a non-integer {name} '{raw}': {}",
                redact_str(next_url)
            ))
        })
    };

    if let Some(raw) = extract_query_param(next_url, PAGE_AFTER_PARAM) {
        return parse(PAGE_AFTER_PARAM, raw).map(PageCursor::After);
    }
    if let Some(raw) = extract_query_param(next_url, PAGE_BEFORE_PARAM) {
        return parse(PAGE_BEFORE_PARAM, raw).map(PageCursor::Before);
    }

    Err(Error::malformed(format!(
        "nextURL carries no page cursor: {}",
        redact_str(next_url)
    )))
}

/// [`redact_url`] for text that may not parse as an absolute URL
fn redact_str(url: &str) -> String {
    match Url::parse(url) {
        Ok(url) => redact_url(&url),
        Err(_) => match url.split_once('?') {
            Some((path, _)) => format!("{path}?<query omitted>"),
            None => url.to_string(),
        },
    }
}
