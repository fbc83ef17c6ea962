// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # voto-relay
//!
//! Streams paginated VOTO API listings to WebSocket consumers, one frame
//! per page.
//!
//! ## Features
//!
//! - **URL Builder**: base URL, endpoint, credential, page size and cursor
//! - **Page Fetcher**: single-attempt GET with typed, validated bodies
//! - **Pagination Driver**: follows `nextURL` cursors with loop guards
//! - **Channel Relay**: axum WebSocket server, one session per request
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voto_relay::config::{ApiConfig, RelayConfig};
//!
//! #[tokio::main]
//! async fn main() -> voto_relay::Result<()> {
//!     let config = RelayConfig::from_api(ApiConfig::new(
//!         "https://go.votomobile.org/api/v1",
//!         "my-key",
//!     ));
//!     config.validate()?;
//!     voto_relay::relay::serve(&config).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! consumer ──{"type":"get-campaigns"}──▶ relay ──▶ pagination ──▶ http
//!                                          │            ▲           │
//! consumer ◀──{"type":"trees",...}─────────┘            └── nextURL ┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the relay
pub mod error;

/// Common types and type aliases
pub mod types;

/// Configuration loading and validation
pub mod config;

/// Upstream URL building, fetching and rate limiting
pub mod http;

/// Cursor-chain pagination driver
pub mod pagination;

/// WebSocket channel relay
pub mod relay;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, ErrorKind, Result};
pub use types::*;

// Re-export commonly used types
pub use config::{ApiConfig, RelayConfig};
pub use pagination::{PageSink, Paginator};
pub use relay::{ChannelMessage, RouteTable};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
