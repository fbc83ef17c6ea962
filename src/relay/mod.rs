//! Channel relay
//!
//! Long-lived WebSocket server bridging consumers to the pagination driver.
//!
//! # Protocol
//!
//! - inbound `{"type": "get-campaigns"}` starts a session on the matching route
//! - outbound `{"type": "trees", "data": {"trees": [...]}}` once per page
//! - optional `stream-end` / `stream-error` frames close a session

mod server;
mod session;
mod types;

pub use server::{router, serve, serve_on, RelayState};
pub use session::{run_session, ChannelSink, Outbound, SessionSummary};
pub use types::{
    Accumulator, ChannelMessage, Completion, FrameOutcome, Route, RouteTable, STREAM_END,
    STREAM_ERROR,
};
