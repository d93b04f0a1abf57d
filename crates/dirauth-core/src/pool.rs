//! Directory connection pool.
//!
//! One slot per endpoint: a semaphore bounds concurrent checkouts and a
//! short-held mutex guards the idle queue. No lock is held across network
//! I/O.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{DirectoryConfig, PoolSettings, ServerEndpoint, ServiceAccount};
use crate::error::{DirectoryError, DirectoryResult};
use crate::model::{Attributes, Modification, SearchQuery};
use crate::session::{BindOutcome, DirectoryConnector, DirectorySession, SearchPage};

/// Runs a backend future under a timeout, mapping expiry to [`DirectoryError::Timeout`].
pub(crate) async fn timed<T>(
    timeout: Duration,
    operation: &str,
    endpoint: &str,
    fut: impl Future<Output = DirectoryResult<T>>,
) -> DirectoryResult<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or_else(|_| Err(DirectoryError::timeout(format!("{operation} on {endpoint}"))))
}

/// Closes a session in the background, bounded by `timeout`.
fn close_detached(mut session: Box<dyn DirectorySession>, timeout: Duration) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            let _ = tokio::time::timeout(timeout, session.close()).await;
        });
    }
}

struct IdleConnection {
    id: Uuid,
    session: Box<dyn DirectorySession>,
    created_at: Instant,
    last_validated: Instant,
}

struct EndpointSlot {
    endpoint: Arc<ServerEndpoint>,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConnection>>,
}

impl EndpointSlot {
    fn pop_idle(&self) -> Option<IdleConnection> {
        self.idle.lock().pop_back()
    }
}

/// Point-in-time view of one endpoint's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Idle connections ready for reuse.
    pub idle: usize,
    /// Connections currently checked out.
    pub in_use: usize,
    /// Maximum concurrent connections.
    pub max: usize,
}

/// Pool of directory connections across all configured endpoints.
pub struct ConnectionPool {
    connector: Arc<dyn DirectoryConnector>,
    settings: PoolSettings,
    service_account: Option<ServiceAccount>,
    slots: HashMap<String, Arc<EndpointSlot>>,
    closed: AtomicBool,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("settings", &self.settings)
            .field("endpoints", &self.slots.keys().collect::<Vec<_>>())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Creates a pool for the given endpoints.
    ///
    /// New connections bind as `service_account` when one is given and stay
    /// anonymous otherwise.
    pub fn new(
        connector: Arc<dyn DirectoryConnector>,
        endpoints: impl IntoIterator<Item = Arc<ServerEndpoint>>,
        settings: PoolSettings,
        service_account: Option<ServiceAccount>,
    ) -> Self {
        let max = settings.max_per_endpoint.max(1);
        let slots = endpoints
            .into_iter()
            .map(|endpoint| {
                let slot = EndpointSlot {
                    endpoint: endpoint.clone(),
                    permits: Arc::new(Semaphore::new(max)),
                    idle: Mutex::new(VecDeque::new()),
                };
                (endpoint.name.clone(), Arc::new(slot))
            })
            .collect();

        Self {
            connector,
            settings,
            service_account,
            slots,
            closed: AtomicBool::new(false),
        }
    }

    /// Creates a pool from a directory configuration.
    pub fn from_config(config: &DirectoryConfig, connector: Arc<dyn DirectoryConnector>) -> Self {
        Self::new(
            connector,
            config.endpoints.iter().cloned().map(Arc::new),
            config.pool.clone(),
            config.service_account.clone(),
        )
    }

    /// Returns the pool settings.
    #[must_use]
    pub const fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Returns true once [`ConnectionPool::shutdown`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn slot(&self, endpoint: &ServerEndpoint) -> DirectoryResult<Arc<EndpointSlot>> {
        self.slots.get(endpoint.id()).cloned().ok_or_else(|| {
            DirectoryError::config(format!("endpoint '{}' is not pooled", endpoint.name))
        })
    }

    /// Checks out a connection to `endpoint`.
    ///
    /// Waits up to the acquire timeout for a free slot. Idle connections
    /// whose last validation is older than the idle lifetime are pinged
    /// first and discarded if the ping fails.
    ///
    /// ## Errors
    ///
    /// - [`DirectoryError::PoolExhausted`] if no slot frees up in time
    /// - [`DirectoryError::PoolClosed`] after shutdown
    /// - connect or service-account bind failures when a new connection is opened
    pub async fn acquire(&self, endpoint: &ServerEndpoint) -> DirectoryResult<PooledConnection> {
        if self.is_closed() {
            return Err(DirectoryError::PoolClosed);
        }
        let slot = self.slot(endpoint)?;

        let permit = match tokio::time::timeout(
            self.settings.acquire_timeout(),
            slot.permits.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(DirectoryError::PoolClosed),
            Err(_) => {
                warn!(endpoint = %endpoint.name, "Connection pool exhausted");
                return Err(DirectoryError::PoolExhausted {
                    endpoint: endpoint.name.clone(),
                });
            }
        };

        let read_timeout = slot.endpoint.read_timeout();
        while let Some(idle) = slot.pop_idle() {
            if self
                .settings
                .max_lifetime()
                .is_some_and(|max| idle.created_at.elapsed() >= max)
            {
                debug!(endpoint = %endpoint.name, connection = %idle.id, "Retiring connection past max lifetime");
                close_detached(idle.session, read_timeout);
                continue;
            }

            if idle.last_validated.elapsed() < self.settings.idle_lifetime() {
                return Ok(PooledConnection::from_idle(idle, slot, permit));
            }

            let mut idle = idle;
            match timed(read_timeout, "validate", &endpoint.name, idle.session.ping()).await {
                Ok(()) => {
                    idle.last_validated = Instant::now();
                    return Ok(PooledConnection::from_idle(idle, slot, permit));
                }
                Err(e) => {
                    debug!(endpoint = %endpoint.name, connection = %idle.id, error = %e, "Discarding stale connection");
                }
            }
        }

        let session = self.open(&slot.endpoint).await?;
        let now = Instant::now();
        let connection = PooledConnection {
            id: Uuid::now_v7(),
            endpoint: slot.endpoint.clone(),
            session: Some(session),
            created_at: now,
            last_validated: now,
            healthy: true,
            slot,
            _permit: permit,
        };
        debug!(endpoint = %endpoint.name, connection = %connection.id, "Opened directory connection");
        Ok(connection)
    }

    /// Opens and (optionally) service-binds a new session.
    async fn open(&self, endpoint: &ServerEndpoint) -> DirectoryResult<Box<dyn DirectorySession>> {
        let mut session = timed(
            endpoint.connect_timeout(),
            "connect",
            &endpoint.name,
            self.connector.connect(endpoint),
        )
        .await?;

        if let Some(account) = &self.service_account {
            let outcome = timed(
                endpoint.read_timeout(),
                "service bind",
                &endpoint.name,
                session.bind(&account.bind_dn, account.password.expose()),
            )
            .await?;

            if outcome == BindOutcome::Rejected {
                close_detached(session, endpoint.read_timeout());
                return Err(DirectoryError::config(format!(
                    "service account was rejected by endpoint '{}'",
                    endpoint.name
                )));
            }
        }

        Ok(session)
    }

    /// Returns a connection to the idle set, or discards it if unhealthy.
    pub fn release(&self, mut connection: PooledConnection) {
        let Some(session) = connection.session.take() else {
            return;
        };
        let read_timeout = connection.endpoint.read_timeout();

        let expired = self
            .settings
            .max_lifetime()
            .is_some_and(|max| connection.created_at.elapsed() >= max);
        if !connection.healthy || expired {
            debug!(
                endpoint = %connection.endpoint.name,
                connection = %connection.id,
                healthy = connection.healthy,
                "Discarding released connection"
            );
            close_detached(session, read_timeout);
            return;
        }

        let mut idle = connection.slot.idle.lock();
        if self.is_closed() {
            drop(idle);
            close_detached(session, read_timeout);
            return;
        }
        idle.push_back(IdleConnection {
            id: connection.id,
            session,
            created_at: connection.created_at,
            last_validated: connection.last_validated,
        });
    }

    /// Closes a connection and removes it from the pool.
    pub async fn invalidate(&self, mut connection: PooledConnection) {
        if let Some(mut session) = connection.session.take() {
            debug!(endpoint = %connection.endpoint.name, connection = %connection.id, "Invalidating connection");
            let _ = tokio::time::timeout(connection.endpoint.read_timeout(), session.close()).await;
        }
    }

    /// Returns the status of one endpoint's pool.
    #[must_use]
    pub fn status(&self, endpoint: &str) -> Option<PoolStatus> {
        self.slots.get(endpoint).map(|slot| {
            let max = self.settings.max_per_endpoint.max(1);
            PoolStatus {
                idle: slot.idle.lock().len(),
                in_use: max.saturating_sub(slot.permits.available_permits()),
                max,
            }
        })
    }

    /// Closes every idle connection and rejects further acquisitions.
    ///
    /// Checked-out connections are discarded when they come back.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);

        let mut closed = 0usize;
        for slot in self.slots.values() {
            slot.permits.close();
            let drained: Vec<IdleConnection> = slot.idle.lock().drain(..).collect();
            for mut idle in drained {
                let _ = tokio::time::timeout(slot.endpoint.read_timeout(), idle.session.close()).await;
                closed += 1;
            }
        }
        info!(closed, "Connection pool shut down");
    }
}

/// A connection checked out of the pool.
///
/// Owned by exactly one caller. Hand it back with
/// [`ConnectionPool::release`]; dropping it instead discards the session,
/// since its protocol state is unknown.
pub struct PooledConnection {
    id: Uuid,
    endpoint: Arc<ServerEndpoint>,
    session: Option<Box<dyn DirectorySession>>,
    created_at: Instant,
    last_validated: Instant,
    healthy: bool,
    slot: Arc<EndpointSlot>,
    _permit: OwnedSemaphorePermit,
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint.name)
            .field("healthy", &self.healthy)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    fn from_idle(idle: IdleConnection, slot: Arc<EndpointSlot>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            id: idle.id,
            endpoint: slot.endpoint.clone(),
            session: Some(idle.session),
            created_at: idle.created_at,
            last_validated: idle.last_validated,
            healthy: true,
            slot,
            _permit: permit,
        }
    }

    /// Returns the connection id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the endpoint this connection talks to.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<ServerEndpoint> {
        &self.endpoint
    }

    /// Returns when the connection was opened.
    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns when the connection was last known to work.
    #[must_use]
    pub const fn last_validated(&self) -> Instant {
        self.last_validated
    }

    /// Returns false once the connection must not be reused.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Marks the connection so that release discards it.
    pub fn mark_unhealthy(&mut self) {
        self.healthy = false;
    }

    fn session(&mut self) -> DirectoryResult<&mut Box<dyn DirectorySession>> {
        self.session
            .as_mut()
            .ok_or_else(|| DirectoryError::Internal("connection already returned".to_string()))
    }

    fn observe<T>(&mut self, result: DirectoryResult<T>) -> DirectoryResult<T> {
        match &result {
            Ok(_) => self.last_validated = Instant::now(),
            Err(e) if e.poisons_connection() => self.healthy = false,
            Err(_) => {}
        }
        result
    }

    /// Performs a simple bind, bounded by the endpoint's read timeout.
    pub async fn bind(&mut self, dn: &str, password: &str) -> DirectoryResult<BindOutcome> {
        let (timeout, name) = (self.endpoint.read_timeout(), self.endpoint.name.clone());
        let session = self.session()?;
        let result = timed(timeout, "bind", &name, session.bind(dn, password)).await;
        self.observe(result)
    }

    /// Fetches one search page, bounded by the endpoint's read timeout.
    pub async fn search_page(
        &mut self,
        query: &SearchQuery,
        cookie: Option<&[u8]>,
    ) -> DirectoryResult<SearchPage> {
        let (timeout, name) = (self.endpoint.read_timeout(), self.endpoint.name.clone());
        let session = self.session()?;
        let result = timed(timeout, "search", &name, session.search_page(query, cookie)).await;
        self.observe(result)
    }

    /// Adds an entry.
    pub async fn add(&mut self, dn: &str, attributes: &Attributes) -> DirectoryResult<()> {
        let (timeout, name) = (self.endpoint.read_timeout(), self.endpoint.name.clone());
        let session = self.session()?;
        let result = timed(timeout, "add", &name, session.add(dn, attributes)).await;
        self.observe(result)
    }

    /// Modifies an entry.
    pub async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> DirectoryResult<()> {
        let (timeout, name) = (self.endpoint.read_timeout(), self.endpoint.name.clone());
        let session = self.session()?;
        let result = timed(timeout, "modify", &name, session.modify(dn, modifications)).await;
        self.observe(result)
    }

    /// Deletes an entry.
    pub async fn delete(&mut self, dn: &str) -> DirectoryResult<()> {
        let (timeout, name) = (self.endpoint.read_timeout(), self.endpoint.name.clone());
        let session = self.session()?;
        let result = timed(timeout, "delete", &name, session.delete(dn)).await;
        self.observe(result)
    }

    /// Checks that the server still answers.
    pub async fn ping(&mut self) -> DirectoryResult<()> {
        let (timeout, name) = (self.endpoint.read_timeout(), self.endpoint.name.clone());
        let session = self.session()?;
        let result = timed(timeout, "ping", &name, session.ping()).await;
        self.observe(result)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.session.is_some() {
            debug!(
                endpoint = %self.endpoint.name,
                connection = %self.id,
                "Connection dropped while checked out; discarding"
            );
        }
    }
}
