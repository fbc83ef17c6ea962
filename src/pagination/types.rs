//! Pagination types and traits
//!
//! Defines the driver configuration, the session state machine and the
//! sink abstraction that receives pages.

use crate::config::StreamSettings;
use crate::error::{Error, Result};
use crate::http::{cursor_from_next_url, PageBody, PageResponse, RequestParams};
use async_trait::async_trait;
use std::num::NonZeroU32;

/// Default page size
pub const DEFAULT_CHUNK_SIZE: NonZeroU32 = match NonZeroU32::new(20) {
    Some(n) => n,
    None => NonZeroU32::MIN,
};

/// Default cap on pages per stream
pub const DEFAULT_MAX_PAGES: u32 = 1000;

/// Result of inspecting a page for a continuation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPage {
    /// Fetch another page with these parameters
    Continue(RequestParams),
    /// The cursor chain ended
    Done,
}

impl NextPage {
    /// Work out the continuation of `body`
    ///
    /// No `nextURL` means the chain ended. A present `nextURL` must carry a
    /// cursor; the new request keeps the page size of the old one.
    pub fn from_body(body: &PageBody, limit: NonZeroU32) -> Result<Self> {
        match body.next_url() {
            None => Ok(Self::Done),
            Some(next_url) => {
                let cursor = cursor_from_next_url(next_url)?;
                Ok(Self::Continue(RequestParams::new(limit).with_cursor(cursor)))
            }
        }
    }

    /// Check if this is a done result
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Check if this is a continue result
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue(_))
    }
}

/// Configuration for the pagination driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationConfig {
    /// Records requested per page
    pub chunk_size: NonZeroU32,
    /// Pages fetched before giving up on a cursor chain
    pub max_pages: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl PaginationConfig {
    /// Create a new pagination config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page size
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: NonZeroU32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the page cap
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }
}

impl TryFrom<StreamSettings> for PaginationConfig {
    type Error = Error;

    fn try_from(settings: StreamSettings) -> Result<Self> {
        let chunk_size = NonZeroU32::new(settings.chunk_size)
            .ok_or_else(|| Error::invalid_value("stream.chunk_size", "must be greater than 0"))?;
        if settings.max_pages == 0 {
            return Err(Error::invalid_value("stream.max_pages", "must be greater than 0"));
        }
        Ok(Self {
            chunk_size,
            max_pages: settings.max_pages,
        })
    }
}

/// Position of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Created, nothing requested yet
    #[default]
    Idle,
    /// Waiting for a page
    Fetching,
    /// Handing a page to the sink
    Delivering,
    /// Cursor chain ended
    Done,
    /// A fetch, parse or guard failed
    Failed,
}

impl StreamState {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether moving to `next` is a legal step
    pub fn can_transition_to(self, next: Self) -> bool {
        use StreamState::{Delivering, Done, Failed, Fetching, Idle};
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Idle, Fetching) | (Fetching, Delivering) | (Delivering, Fetching | Done) => true,
            _ => false,
        }
    }
}

/// Summary of a finished stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSummary {
    /// Pages delivered to the sink
    pub pages: u32,
}

/// Receiver of pages, called once per page in order
#[async_trait]
pub trait PageSink: Send {
    /// Take one page. An error stops the stream; no further page is fetched.
    async fn deliver(&mut self, page: PageResponse) -> Result<()>;
}

#[async_trait]
impl PageSink for Vec<PageResponse> {
    async fn deliver(&mut self, page: PageResponse) -> Result<()> {
        self.push(page);
        Ok(())
    }
}
