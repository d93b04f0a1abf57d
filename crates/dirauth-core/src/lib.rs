//! # dirauth-core
//!
//! Directory-backed credential verification.
//!
//! This crate verifies credentials and runs searches against one or more
//! LDAP servers. It pools connections, picks endpoints in failover order,
//! retries transient failures and enforces per-operation timeouts. The wire
//! protocol lives behind the [`DirectoryConnector`] / [`DirectorySession`]
//! traits; `dirauth-ldap` implements them with `ldap3`.
//!
//! ## Features
//!
//! - Direct bind and search-then-bind verification
//! - Lazy paged search with explicit partial-result reporting
//! - Priority or weighted round-robin endpoint selection with cooldown
//! - Bounded retry with per-attempt timeouts and an overall deadline
//!
//! ## Example
//!
//! ```ignore
//! use dirauth_core::{DirectoryConfig, DirectoryService, ServerEndpoint};
//!
//! let config = DirectoryConfig::builder()
//!     .endpoint(ServerEndpoint::new("primary", "ldap.example.com")
//!         .with_bind_dn_template("uid={username},ou=people,dc=example,dc=com"))
//!     .build()?;
//! let service = DirectoryService::new(config, connector)?;
//!
//! let result = service.verify_credentials("jdoe", "s3cret").await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod diff;
pub mod error;
pub mod filter;
pub mod model;
pub mod pool;
pub mod retry;
pub mod search;
pub mod selector;
pub mod service;
pub mod session;
pub mod verifier;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{
    DirectoryConfig, DirectoryConfigBuilder, EditMode, FailoverMode, PoolSettings, RetryPolicy,
    SelectionMode, ServerEndpoint, ServiceAccount, TransportSecurity, VerificationStrategy,
};
pub use diff::compute_modifications;
pub use error::{DirectoryError, DirectoryResult};
pub use model::{
    Attributes, CredentialRequest, DirectoryEntry, Modification, SearchQuery, SearchScope, Secret,
    VerificationResult,
};
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};
pub use retry::{RequestState, RetryCoordinator};
pub use search::{SearchEngine, SearchOutcome, SearchResults};
pub use selector::ServerSelector;
pub use service::{DirectoryService, EndpointReport};
pub use session::{BindOutcome, DirectoryConnector, DirectorySession, SearchPage};
pub use verifier::CredentialVerifier;
