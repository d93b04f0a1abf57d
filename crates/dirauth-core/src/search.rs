//! Directory search with lazy paging.
//!
//! [`SearchEngine::open`] fetches the first page; [`SearchResults`] pulls
//! the rest on demand. When the last page arrives the connection goes back
//! to the pool. Abandoning a cursor early discards the connection, since
//! the server still holds paging state for it.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, Stream};
use serde::Serialize;
use tracing::debug;

use crate::error::{DirectoryError, DirectoryResult};
use crate::filter::is_balanced_filter;
use crate::model::{DirectoryEntry, SearchQuery};
use crate::pool::{ConnectionPool, PooledConnection};

/// Runs searches on pooled connections.
#[derive(Debug, Clone, Copy)]
pub struct SearchEngine {
    default_page_size: u32,
}

impl SearchEngine {
    /// Creates an engine; queries without a page size use `default_page_size`.
    ///
    /// A `default_page_size` of 0 sends those queries unpaged.
    #[must_use]
    pub const fn new(default_page_size: u32) -> Self {
        Self { default_page_size }
    }

    /// Checks a query before any connection is used.
    ///
    /// ## Errors
    ///
    /// Returns [`DirectoryError::MalformedFilter`] for filters that are
    /// structurally broken.
    pub fn validate(query: &SearchQuery) -> DirectoryResult<()> {
        if !is_balanced_filter(&query.filter) {
            return Err(DirectoryError::MalformedFilter(query.filter.clone()));
        }
        Ok(())
    }

    /// Starts a search on `connection` and fetches the first page.
    ///
    /// The connection is owned by the returned cursor until it finishes.
    ///
    /// ## Errors
    ///
    /// Fails with [`DirectoryError::MalformedFilter`] if the server cannot
    /// parse the filter, or [`DirectoryError::Timeout`] if the first page
    /// does not arrive within the read timeout.
    pub async fn open(
        &self,
        mut query: SearchQuery,
        connection: PooledConnection,
        pool: Arc<ConnectionPool>,
    ) -> DirectoryResult<SearchResults> {
        Self::validate(&query)?;
        if query.page_size == 0 {
            query.page_size = self.default_page_size;
        }

        let mut results = SearchResults {
            query,
            connection: Some(connection),
            pool,
            buffer: VecDeque::new(),
            cookie: None,
            partial: false,
            received: 0,
            finished: false,
        };
        results.fetch_page().await?;
        Ok(results)
    }
}

/// Entries collected from a finished search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchOutcome {
    /// Entries in server order.
    pub entries: Vec<DirectoryEntry>,

    /// True when the server truncated the result set.
    pub partial: bool,
}

impl SearchOutcome {
    /// Returns the entries, or [`DirectoryError::PartialResult`] if the
    /// server truncated them.
    pub fn into_complete(self) -> DirectoryResult<Vec<DirectoryEntry>> {
        if self.partial {
            Err(DirectoryError::PartialResult {
                received: self.entries.len(),
            })
        } else {
            Ok(self.entries)
        }
    }
}

/// Forward-only cursor over search results.
///
/// Not restartable: once the cursor finishes, fails or is dropped, the
/// underlying connection is gone.
pub struct SearchResults {
    query: SearchQuery,
    connection: Option<PooledConnection>,
    pool: Arc<ConnectionPool>,
    buffer: VecDeque<DirectoryEntry>,
    cookie: Option<Vec<u8>>,
    partial: bool,
    received: usize,
    finished: bool,
}

impl std::fmt::Debug for SearchResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchResults")
            .field("base_dn", &self.query.base_dn)
            .field("filter", &self.query.filter)
            .field("buffered", &self.buffer.len())
            .field("received", &self.received)
            .field("partial", &self.partial)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl SearchResults {
    /// Returns true if the server truncated the results seen so far.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.partial
    }

    /// Number of entries received from the server so far.
    #[must_use]
    pub const fn received(&self) -> usize {
        self.received
    }

    /// Returns true once the server has sent its last page.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns the query this cursor runs.
    #[must_use]
    pub const fn query(&self) -> &SearchQuery {
        &self.query
    }

    async fn fetch_page(&mut self) -> DirectoryResult<()> {
        let Some(connection) = self.connection.as_mut() else {
            self.finished = true;
            return Ok(());
        };

        match connection.search_page(&self.query, self.cookie.as_deref()).await {
            Ok(page) => {
                self.received += page.entries.len();
                self.buffer.extend(page.entries);
                self.partial |= page.truncated;
                self.cookie = page.cookie;
                if self.cookie.is_none() {
                    self.finish();
                }
                Ok(())
            }
            Err(e) => {
                self.finished = true;
                // Paging state on the server is unknown.
                if let Some(mut connection) = self.connection.take() {
                    connection.mark_unhealthy();
                    self.pool.release(connection);
                }
                Err(e)
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(connection) = self.connection.take() {
            self.pool.release(connection);
        }
        debug!(
            base_dn = %self.query.base_dn,
            received = self.received,
            partial = self.partial,
            "Search finished"
        );
    }

    /// Returns the next entry, fetching another page when needed.
    ///
    /// ## Errors
    ///
    /// Returns the failure of a page fetch. The cursor is finished afterwards.
    pub async fn next_entry(&mut self) -> DirectoryResult<Option<DirectoryEntry>> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                return Ok(Some(entry));
            }
            if self.finished {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    /// Returns the next non-empty page of entries.
    ///
    /// ## Errors
    ///
    /// Returns the failure of a page fetch.
    pub async fn next_page(&mut self) -> DirectoryResult<Option<Vec<DirectoryEntry>>> {
        while self.buffer.is_empty() {
            if self.finished {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
        Ok(Some(self.buffer.drain(..).collect()))
    }

    /// Reads every remaining entry.
    ///
    /// ## Errors
    ///
    /// Returns the failure of a page fetch; entries read so far are lost.
    pub async fn collect(mut self) -> DirectoryResult<SearchOutcome> {
        let mut entries = Vec::with_capacity(self.buffer.len());
        while let Some(page) = self.next_page().await? {
            entries.extend(page);
        }
        Ok(SearchOutcome {
            entries,
            partial: self.partial,
        })
    }

    /// Stops reading. An open server cursor discards its connection.
    pub async fn close(mut self) {
        if let Some(connection) = self.connection.take() {
            debug!(base_dn = %self.query.base_dn, "Search abandoned with an open cursor");
            self.pool.invalidate(connection).await;
        }
    }

    /// Converts the cursor into a stream of entries.
    pub fn into_stream(self) -> impl Stream<Item = DirectoryResult<DirectoryEntry>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut results = state?;
            match results.next_entry().await {
                Ok(Some(entry)) => Some((Ok(entry), Some(results))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl Drop for SearchResults {
    fn drop(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            debug!(base_dn = %self.query.base_dn, "Search cursor dropped before completion");
            connection.mark_unhealthy();
            self.pool.release(connection);
        }
    }
}
