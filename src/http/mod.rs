//! Upstream HTTP access
//!
//! Builds page URLs, performs single-attempt GETs and parses page bodies.
//!
//! # Features
//!
//! - **URL Builder**: base + endpoint + credential + limit + one cursor
//! - **Page Fetcher**: one request per page, typed `{ metadata, body }` result
//! - **Rate Limiting**: optional token bucket throttle using governor

mod client;
mod fetcher;
mod rate_limit;
mod url_builder;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder};
pub use fetcher::{
    HttpPageFetcher, PageBody, PageResponse, PageSource, PaginationLinks, ResponseMetadata,
};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use url_builder::{
    build_url, cursor_from_next_url, extract_query_param, redact_url, PageCursor, RequestParams,
    API_KEY_PARAM, LIMIT_PARAM, PAGE_AFTER_PARAM, PAGE_BEFORE_PARAM,
};

#[cfg(test)]
mod tests;
