//! Inbound directory API.
//!
//! [`DirectoryService`] owns the pool, selector, coordinator, verifier and
//! search engine for one configuration. It is an ordinary value: create one
//! at startup, share it behind an `Arc`, and call
//! [`DirectoryService::shutdown`] on the way out.
//!
//! ## Security
//!
//! - Secrets are never logged; spans skip them.
//! - Failed verifications take at least the configured failure latency
//!   floor, whether the principal exists or not.
//! - Writes are refused unless the edit mode is `Writable`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::DirectoryConfig;
use crate::diff::compute_modifications;
use crate::error::{DirectoryError, DirectoryResult};
use crate::model::{
    Attributes, CredentialRequest, DirectoryEntry, Modification, SearchQuery, SearchScope, Secret,
    VerificationResult,
};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::retry::RetryCoordinator;
use crate::search::{SearchEngine, SearchOutcome, SearchResults};
use crate::selector::ServerSelector;
use crate::session::DirectoryConnector;
use crate::verifier::CredentialVerifier;

const ANY_OBJECT: &str = "(objectClass=*)";

/// Result of probing one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointReport {
    /// Endpoint name.
    pub name: String,
    /// Connection URL.
    pub url: String,
    /// Whether the endpoint answered.
    pub reachable: bool,
    /// Round-trip time of the probe in milliseconds.
    pub latency_ms: u64,
    /// Failure description when unreachable.
    pub error: Option<String>,
}

/// Credential verification and directory access over a set of endpoints.
#[derive(Debug)]
pub struct DirectoryService {
    config: DirectoryConfig,
    pool: Arc<ConnectionPool>,
    coordinator: RetryCoordinator,
    verifier: CredentialVerifier,
    engine: SearchEngine,
}

impl DirectoryService {
    /// Creates a service for a validated configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: DirectoryConfig, connector: Arc<dyn DirectoryConnector>) -> DirectoryResult<Self> {
        config.validate()?;

        let selector = Arc::new(ServerSelector::from_config(&config));
        let pool = Arc::new(ConnectionPool::new(
            connector,
            selector.endpoints().iter().cloned(),
            config.pool.clone(),
            config.service_account.clone(),
        ));
        let coordinator = RetryCoordinator::new(selector, config.retry.clone());
        let verifier = CredentialVerifier::from_config(&config);
        let engine = SearchEngine::new(config.page_size);

        info!(
            endpoints = config.endpoints.len(),
            strategy = ?config.strategy,
            edit_mode = ?config.edit_mode,
            "Directory service initialized"
        );

        Ok(Self {
            config,
            pool,
            coordinator,
            verifier,
            engine,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Returns the connection pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Returns the endpoint selector.
    #[must_use]
    pub fn selector(&self) -> &Arc<ServerSelector> {
        self.coordinator.selector()
    }

    // ========================================================================
    // Verification
    // ========================================================================

    /// Verifies a principal and secret.
    ///
    /// ## Errors
    ///
    /// See [`DirectoryService::verify`].
    pub async fn verify_credentials(
        &self,
        principal: &str,
        secret: impl Into<Secret>,
    ) -> DirectoryResult<VerificationResult> {
        self.verify(CredentialRequest::new(principal, secret)).await
    }

    /// Verifies a credential request.
    ///
    /// Unreachable servers and timeouts come back as
    /// [`VerificationResult::ServerUnavailable`] and
    /// [`VerificationResult::Timeout`] once retries are exhausted.
    ///
    /// ## Errors
    ///
    /// Configuration and capacity problems (`Configuration`,
    /// `PoolExhausted`, `PoolClosed`, `MalformedFilter`) are returned as
    /// errors.
    #[instrument(skip(self, request), fields(principal = %request.principal))]
    pub async fn verify(&self, request: CredentialRequest) -> DirectoryResult<VerificationResult> {
        let started = Instant::now();

        if let Some(result) = CredentialVerifier::precheck(&request) {
            self.pad_failure(started).await;
            info!(outcome = ?result, "Credentials rejected locally");
            return Ok(result);
        }

        let request = &request;
        let attempt = self
            .coordinator
            .execute("verify", |endpoint| async move {
                let mut connection = self.pool.acquire(&endpoint).await?;
                let result = self.verifier.verify(request, &mut connection).await;
                self.pool.release(connection);
                result
            })
            .await;

        let result = match attempt {
            Ok(result) => result,
            Err(DirectoryError::Timeout(reason)) => {
                warn!(reason = %reason, "Verification timed out");
                VerificationResult::Timeout
            }
            Err(e) if e.is_transient() || matches!(e, DirectoryError::NoCandidates) => {
                warn!(error = %e, "No directory server could verify credentials");
                VerificationResult::ServerUnavailable
            }
            Err(e) => return Err(e),
        };

        if result.is_auth_failure() {
            self.pad_failure(started).await;
        }
        match &result {
            VerificationResult::Success { dn, .. } => info!(dn = %dn, "Credentials verified"),
            other => info!(outcome = ?other, "Credentials not verified"),
        }
        Ok(result)
    }

    /// Sleeps until the failure latency floor has elapsed since `started`.
    async fn pad_failure(&self, started: Instant) {
        let floor = self.config.failure_delay_floor();
        if let Some(rest) = floor.checked_sub(started.elapsed()) {
            if !rest.is_zero() {
                tokio::time::sleep(rest).await;
            }
        }
    }

    // ========================================================================
    // Search and browsing
    // ========================================================================

    /// Starts a search and returns a lazy cursor.
    ///
    /// Only the first page is covered by retry and failover; later pages
    /// are read from the same server.
    ///
    /// ## Errors
    ///
    /// Returns `MalformedFilter` without touching the network for
    /// structurally broken filters, and the coordinator's error otherwise.
    #[instrument(skip(self, query), fields(base_dn = %query.base_dn, filter = %query.filter))]
    pub async fn search(&self, query: SearchQuery) -> DirectoryResult<SearchResults> {
        SearchEngine::validate(&query)?;
        let query = &query;
        self.coordinator
            .execute("search", |endpoint| async move {
                let connection = self.pool.acquire(&endpoint).await?;
                self.engine
                    .open(query.clone(), connection, self.pool.clone())
                    .await
            })
            .await
    }

    /// Runs a search to completion.
    ///
    /// ## Errors
    ///
    /// See [`DirectoryService::search`].
    pub async fn search_all(&self, query: SearchQuery) -> DirectoryResult<SearchOutcome> {
        self.search(query).await?.collect().await
    }

    /// Lists the immediate children of `dn`.
    ///
    /// ## Errors
    ///
    /// See [`DirectoryService::search`].
    pub async fn children(&self, dn: &str) -> DirectoryResult<SearchOutcome> {
        self.search_all(SearchQuery::new(dn, ANY_OBJECT).scope(SearchScope::OneLevel))
            .await
    }

    /// Reads a single entry, or `None` if it does not exist.
    ///
    /// ## Errors
    ///
    /// See [`DirectoryService::search`].
    pub async fn entry(&self, dn: &str) -> DirectoryResult<Option<DirectoryEntry>> {
        let query = SearchQuery::new(dn, ANY_OBJECT).scope(SearchScope::Base);
        match self.search_all(query).await {
            Ok(outcome) => Ok(outcome.entries.into_iter().next()),
            Err(DirectoryError::NoSuchEntry(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Probes every endpoint with a fresh connection.
    pub async fn test_connection(&self) -> Vec<EndpointReport> {
        let mut reports = Vec::new();
        for endpoint in self.selector().endpoints() {
            let started = Instant::now();
            let result = match self.pool.acquire(endpoint).await {
                Ok(mut connection) => {
                    let result = connection.ping().await;
                    self.pool.release(connection);
                    result
                }
                Err(e) => Err(e),
            };
            let latency_ms = elapsed_ms(started.elapsed());

            match &result {
                Ok(()) => info!(endpoint = %endpoint.name, latency_ms, "Endpoint reachable"),
                Err(e) => warn!(endpoint = %endpoint.name, error = %e, "Endpoint unreachable"),
            }
            reports.push(EndpointReport {
                name: endpoint.name.clone(),
                url: endpoint.url(),
                reachable: result.is_ok(),
                latency_ms,
                error: result.err().map(|e| e.to_string()),
            });
        }
        reports
    }

    // ========================================================================
    // Writes
    // ========================================================================

    fn ensure_writable(&self, operation: &str) -> DirectoryResult<()> {
        if self.config.edit_mode.is_writable() {
            Ok(())
        } else {
            Err(DirectoryError::ReadOnly(operation.to_string()))
        }
    }

    /// Runs a write on one connection. Failures after the request was
    /// sent are never retried.
    async fn write<F, Fut>(&self, operation: &'static str, op: F) -> DirectoryResult<()>
    where
        F: Fn(PooledConnection) -> Fut,
        Fut: Future<Output = (PooledConnection, DirectoryResult<()>)>,
    {
        self.ensure_writable(operation)?;
        let op = &op;
        self.coordinator
            .execute(operation, |endpoint| async move {
                let connection = self.pool.acquire(&endpoint).await?;
                let (connection, result) = op(connection).await;
                self.pool.release(connection);
                result.map_err(|e| e.into_write_error(operation))
            })
            .await
    }

    /// Adds an entry.
    ///
    /// ## Errors
    ///
    /// Returns `ReadOnly` unless writes are enabled.
    #[instrument(skip(self, entry), fields(dn = %entry.dn))]
    pub async fn add_entry(&self, entry: &DirectoryEntry) -> DirectoryResult<()> {
        self.write("add", |mut connection| async move {
            let result = connection.add(&entry.dn, &entry.attributes).await;
            (connection, result)
        })
        .await?;
        info!("Entry added");
        Ok(())
    }

    /// Replaces one attribute with a single value.
    ///
    /// ## Errors
    ///
    /// Returns `ReadOnly` unless writes are enabled.
    #[instrument(skip(self, value))]
    pub async fn modify_attribute(&self, dn: &str, attribute: &str, value: &str) -> DirectoryResult<()> {
        let modification = [Modification::Replace {
            attribute: attribute.to_string(),
            values: vec![value.to_string()],
        }];
        let modification = &modification;
        self.write("modify", |mut connection| async move {
            let result = connection.modify(dn, modification).await;
            (connection, result)
        })
        .await?;
        info!("Attribute replaced");
        Ok(())
    }

    /// Writes the difference between `original` and `modified`.
    ///
    /// Returns the number of modifications sent; nothing is sent when the
    /// entries match.
    ///
    /// ## Errors
    ///
    /// Returns `ReadOnly` unless writes are enabled.
    #[instrument(skip(self, original, modified), fields(dn = %original.dn))]
    pub async fn update_entry(
        &self,
        original: &DirectoryEntry,
        modified: &DirectoryEntry,
    ) -> DirectoryResult<usize> {
        self.ensure_writable("modify")?;
        let modifications = compute_modifications(original, modified);
        if modifications.is_empty() {
            info!("No changes to write");
            return Ok(0);
        }

        let dn = original.dn.as_str();
        let mods = &modifications;
        self.write("modify", |mut connection| async move {
            let result = connection.modify(dn, mods).await;
            (connection, result)
        })
        .await?;
        info!(changes = modifications.len(), "Entry updated");
        Ok(modifications.len())
    }

    /// Deletes an entry.
    ///
    /// ## Errors
    ///
    /// Returns `ReadOnly` unless writes are enabled.
    #[instrument(skip(self))]
    pub async fn delete_entry(&self, dn: &str) -> DirectoryResult<()> {
        self.write("delete", |mut connection| async move {
            let result = connection.delete(dn).await;
            (connection, result)
        })
        .await?;
        info!("Entry deleted");
        Ok(())
    }

    /// Returns the attributes of `dn` as a plain map.
    ///
    /// ## Errors
    ///
    /// Returns `NoSuchEntry` if the entry does not exist.
    pub async fn attributes(&self, dn: &str) -> DirectoryResult<Attributes> {
        self.entry(dn)
            .await?
            .map(|entry| entry.attributes)
            .ok_or_else(|| DirectoryError::NoSuchEntry(dn.to_string()))
    }

    /// Closes all pooled connections. Later calls fail with `PoolClosed`.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        info!("Directory service shut down");
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
