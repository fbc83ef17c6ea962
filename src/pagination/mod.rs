//! Pagination module
//!
//! Flattens the upstream's `nextURL` cursor chain into an ordered sequence
//! of pages.
//!
//! # Overview
//!
//! - `Paginator::pages` yields pages lazily as a `Stream`
//! - `Paginator::stream` pushes every page into a `PageSink`
//! - `StreamState` tracks where a session is; `Done` and `Failed` are final

mod driver;
mod types;

pub use driver::Paginator;
pub use types::{
    NextPage, PageSink, PaginationConfig, StreamState, StreamSummary, DEFAULT_CHUNK_SIZE,
    DEFAULT_MAX_PAGES,
};
