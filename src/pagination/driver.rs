//! Pagination driver
//!
//! Walks a cursor chain one page at a time. The walk is an explicit loop
//! over a has-next predicate with two guards: a cursor seen before anywhere
//! in the chain fails the stream, and so does running past `max_pages`.

use super::types::{NextPage, PageSink, PaginationConfig, StreamState, StreamSummary};
use crate::error::{Error, Result};
use crate::http::{PageCursor, PageResponse, PageSource, RequestParams};
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Private state of one streaming operation
#[derive(Debug)]
struct StreamSession {
    config: PaginationConfig,
    state: StreamState,
    next: Option<RequestParams>,
    seen: HashSet<PageCursor>,
    pages: u32,
}

impl StreamSession {
    fn new(config: PaginationConfig) -> Self {
        Self {
            config,
            state: StreamState::Idle,
            next: Some(RequestParams::new(config.chunk_size)),
            seen: HashSet::new(),
            pages: 0,
        }
    }

    fn transition(&mut self, next: StreamState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal stream transition {:?} -> {next:?}",
            self.state
        );
        self.state = next;
    }

    /// Parameters of the next fetch, or `None` once the chain ended
    fn begin_fetch(&mut self) -> Result<Option<RequestParams>> {
        let Some(params) = self.next.take() else {
            return Ok(None);
        };
        if self.pages >= self.config.max_pages {
            return Err(self.fail(Error::PageLimitExceeded {
                max_pages: self.config.max_pages,
            }));
        }
        self.transition(StreamState::Fetching);
        Ok(Some(params))
    }

    /// Record a fetched page and resolve its continuation
    fn received(&mut self, page: &PageResponse) -> Result<()> {
        self.transition(StreamState::Delivering);
        self.pages += 1;

        match NextPage::from_body(&page.body, self.config.chunk_size) {
            Ok(NextPage::Done) => {
                self.transition(StreamState::Done);
                Ok(())
            }
            Ok(NextPage::Continue(params)) => {
                if let Some(cursor) = params.cursor() {
                    if !self.seen.insert(cursor) {
                        return Err(self.fail(Error::CursorNotAdvancing {
                            cursor: cursor.value(),
                        }));
                    }
                }
                self.next = Some(params);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        self.next = None;
        self.transition(StreamState::Failed);
        error
    }
}

/// Step of the lazy page stream
enum Step {
    Fetch(StreamSession),
    /// A page was yielded but its continuation was invalid
    Fail(Error),
    End,
}

/// Drives a [`PageSource`] through a cursor chain
#[derive(Clone)]
pub struct Paginator {
    source: Arc<dyn PageSource>,
    config: PaginationConfig,
}

impl Paginator {
    /// Create a paginator over `source`
    pub fn new(source: Arc<dyn PageSource>, config: PaginationConfig) -> Self {
        Self { source, config }
    }

    /// Get the configuration
    pub fn config(&self) -> &PaginationConfig {
        &self.config
    }

    /// Lazy stream of the pages of `endpoint`
    ///
    /// Nothing is fetched until the stream is polled, and page N+1 is only
    /// requested when the consumer polls again after taking page N. A page
    /// whose `nextURL` cannot be followed is still yielded; the error comes
    /// as the following item. The stream ends after the first error.
    pub fn pages<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> impl Stream<Item = Result<PageResponse>> + Send + 'a {
        let session = StreamSession::new(self.config);

        futures::stream::unfold(Step::Fetch(session), move |step| async move {
            let mut session = match step {
                Step::Fetch(session) => session,
                Step::Fail(e) => return Some((Err(e), Step::End)),
                Step::End => return None,
            };

            let params = match session.begin_fetch() {
                Ok(Some(params)) => params,
                Ok(None) => return None,
                Err(e) => return Some((Err(e), Step::End)),
            };

            let page = match self.source.fetch(endpoint, &params).await {
                Ok(page) => page,
                Err(e) => return Some((Err(session.fail(e)), Step::End)),
            };

            debug!(
                endpoint,
                page = session.pages + 1,
                cursor = ?params.cursor(),
                "Fetched page"
            );

            match session.received(&page) {
                Ok(()) if session.state == StreamState::Done => Some((Ok(page), Step::End)),
                Ok(()) => Some((Ok(page), Step::Fetch(session))),
                Err(e) => Some((Ok(page), Step::Fail(e))),
            }
        })
    }

    /// Stream every page of `endpoint` into `sink`
    ///
    /// The sink sees each page exactly once, in order, before the next page
    /// is requested. The first fetch, parse, guard or sink error ends the
    /// stream and is returned.
    pub async fn stream<S>(&self, endpoint: &str, sink: &mut S) -> Result<StreamSummary>
    where
        S: PageSink + ?Sized,
    {
        let mut summary = StreamSummary::default();
        let mut pages = Box::pin(self.pages(endpoint));

        while let Some(page) = pages.next().await {
            sink.deliver(page?).await?;
            summary.pages += 1;
        }

        debug!(endpoint, pages = summary.pages, "Stream complete");
        Ok(summary)
    }
}

impl std::fmt::Debug for Paginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
