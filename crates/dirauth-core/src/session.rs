//! Session traits implemented by directory backends.
//!
//! The core never speaks the wire protocol itself. A [`DirectoryConnector`]
//! opens sessions to an endpoint; a [`DirectorySession`] performs single
//! protocol operations on one connection. Timeouts, pooling and retries are
//! layered on top by the core.

use async_trait::async_trait;

use crate::config::ServerEndpoint;
use crate::error::DirectoryResult;
use crate::model::{Attributes, DirectoryEntry, Modification, SearchQuery};

/// Outcome of a simple bind the server answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The server accepted the credentials.
    Accepted,
    /// The server rejected the credentials (result code 49).
    Rejected,
}

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Entries in server order.
    pub entries: Vec<DirectoryEntry>,

    /// Paging cookie; `None` when the server has no more pages.
    pub cookie: Option<Vec<u8>>,

    /// True when the server stopped early because of a size or time limit.
    pub truncated: bool,
}

/// Opens sessions to directory endpoints.
#[async_trait]
pub trait DirectoryConnector: Send + Sync + 'static {
    /// Opens a new session to the endpoint.
    ///
    /// Implementations establish the transport (including TLS or StartTLS)
    /// but do not bind.
    async fn connect(&self, endpoint: &ServerEndpoint) -> DirectoryResult<Box<dyn DirectorySession>>;
}

/// A live connection to one directory server.
///
/// A session is used by exactly one operation at a time.
#[async_trait]
pub trait DirectorySession: Send {
    /// Performs a simple bind.
    ///
    /// Rejected credentials are reported as [`BindOutcome::Rejected`];
    /// every other non-success result is an error.
    async fn bind(&mut self, dn: &str, password: &str) -> DirectoryResult<BindOutcome>;

    /// Fetches one page of a search.
    ///
    /// `cookie` is `None` for the first page. A query with `page_size == 0`
    /// returns everything in a single page.
    async fn search_page(
        &mut self,
        query: &SearchQuery,
        cookie: Option<&[u8]>,
    ) -> DirectoryResult<SearchPage>;

    /// Adds an entry.
    async fn add(&mut self, dn: &str, attributes: &Attributes) -> DirectoryResult<()>;

    /// Applies modifications to an entry.
    async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> DirectoryResult<()>;

    /// Deletes an entry.
    async fn delete(&mut self, dn: &str) -> DirectoryResult<()>;

    /// Lightweight liveness check (root DSE read).
    async fn ping(&mut self) -> DirectoryResult<()>;

    /// Unbinds and closes the connection.
    async fn close(&mut self);
}
