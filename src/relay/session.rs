//! Relay sessions
//!
//! A session answers one inbound request: it runs the pagination driver
//! for the route's endpoint and queues one outbound frame per page on the
//! connection that asked.

use super::types::{ChannelMessage, Route};
use crate::error::{Error, Result};
use crate::http::PageResponse;
use crate::pagination::{PageSink, Paginator};
use crate::types::JsonValue;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Sending half of a connection's outbound queue
pub type Outbound = mpsc::Sender<ChannelMessage>;

/// Result of a finished session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSummary {
    /// Frames sent, one per page
    pub pages: u32,
    /// Records forwarded across all frames
    pub records: usize,
}

/// [`PageSink`] that turns pages into outbound frames
#[derive(Debug)]
pub struct ChannelSink {
    outbound: Outbound,
    route: Route,
    records: usize,
}

impl ChannelSink {
    /// Create a sink for `route` writing to `outbound`
    pub fn new(outbound: Outbound, route: Route) -> Self {
        Self {
            outbound,
            route,
            records: 0,
        }
    }

    /// Records forwarded so far
    pub fn records(&self) -> usize {
        self.records
    }
}

#[async_trait]
impl PageSink for ChannelSink {
    async fn deliver(&mut self, page: PageResponse) -> Result<()> {
        let mut data = page.body.data;
        let records = match data.remove(&self.route.record_key) {
            Some(JsonValue::Array(records)) => records,
            Some(_) => {
                return Err(Error::malformed(format!(
                    "'data.{}' is not an array",
                    self.route.record_key
                )))
            }
            None => {
                return Err(Error::malformed(format!(
                    "Page has no 'data.{}' records",
                    self.route.record_key
                )))
            }
        };

        let count = records.len();
        let message = ChannelMessage::records(
            self.route.response.clone(),
            self.route.record_key.clone(),
            records,
        );
        self.outbound
            .send(message)
            .await
            .map_err(|_| Error::ChannelClosed)?;

        self.records += count;
        debug!(request = %self.route.request, records = count, "Queued page frame");
        Ok(())
    }
}

/// Answer one request on `route`
///
/// Failures are logged here and end the session only; the connection stays
/// open. With `announce` set, a `stream-end` or `stream-error` frame
/// follows the last page.
pub async fn run_session(
    paginator: &Paginator,
    route: &Route,
    outbound: Outbound,
    announce: bool,
) -> Result<SessionSummary> {
    info!(request = %route.request, endpoint = %route.endpoint, "Starting stream");

    let mut sink = ChannelSink::new(outbound.clone(), route.clone());
    let result = paginator.stream(&route.endpoint, &mut sink).await;

    match result {
        Ok(summary) => {
            let summary = SessionSummary {
                pages: summary.pages,
                records: sink.records(),
            };
            info!(
                request = %route.request,
                pages = summary.pages,
                records = summary.records,
                "Stream finished"
            );
            if announce {
                let end = ChannelMessage::stream_end(&route.request, summary.pages, summary.records);
                if outbound.send(end).await.is_err() {
                    debug!(request = %route.request, "Connection gone before stream-end");
                }
            }
            Ok(summary)
        }
        Err(e) => {
            error!(
                request = %route.request,
                kind = ?e.kind(),
                error = %e,
                "Stream failed"
            );
            if announce && !matches!(e, Error::ChannelClosed) {
                let failure = ChannelMessage::stream_error(&route.request, e.to_string());
                if outbound.send(failure).await.is_err() {
                    debug!(request = %route.request, "Connection gone before stream-error");
                }
            }
            Err(e)
        }
    }
}
