//! Credential verification.
//!
//! ## Security
//!
//! - Empty secrets are rejected before any connection is touched; most
//!   directories accept an empty-password bind as an anonymous success.
//! - A search matching more than one entry never authenticates.
//! - Connections used for a user bind are never returned to the idle pool.

use tracing::{debug, warn};

use crate::config::{DirectoryConfig, VerificationStrategy};
use crate::error::{DirectoryError, DirectoryResult};
use crate::filter::{looks_like_dn, render_dn_template, render_filter_template};
use crate::model::{Attributes, CredentialRequest, SearchQuery, SearchScope, VerificationResult};
use crate::pool::PooledConnection;
use crate::session::BindOutcome;

/// Attribute list that asks the server for no attributes.
const NO_ATTRIBUTES: &str = "1.1";

/// Verifies credentials with the configured strategy.
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    strategy: VerificationStrategy,
    base_dn: Option<String>,
    user_attributes: Vec<String>,
}

impl CredentialVerifier {
    /// Creates a verifier.
    #[must_use]
    pub fn new(
        strategy: VerificationStrategy,
        base_dn: Option<String>,
        user_attributes: Vec<String>,
    ) -> Self {
        Self {
            strategy,
            base_dn,
            user_attributes,
        }
    }

    /// Creates a verifier from a directory configuration.
    #[must_use]
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self::new(
            config.strategy.clone(),
            config.base_dn.clone(),
            config.user_attributes.clone(),
        )
    }

    /// Returns the strategy.
    #[must_use]
    pub const fn strategy(&self) -> &VerificationStrategy {
        &self.strategy
    }

    /// Decides a request locally when no server round-trip is needed.
    #[must_use]
    pub fn precheck(request: &CredentialRequest) -> Option<VerificationResult> {
        if request.secret.is_empty() {
            return Some(VerificationResult::InvalidCredentials);
        }
        if request.principal.trim().is_empty() {
            return Some(VerificationResult::PrincipalNotFound);
        }
        None
    }

    /// Verifies `request` on `connection`.
    ///
    /// Authentication failures are returned as [`VerificationResult`]
    /// variants; errors are reserved for transport and protocol failures.
    pub async fn verify(
        &self,
        request: &CredentialRequest,
        connection: &mut PooledConnection,
    ) -> DirectoryResult<VerificationResult> {
        if let Some(result) = Self::precheck(request) {
            return Ok(result);
        }

        match &self.strategy {
            VerificationStrategy::DirectBind => self.direct_bind(request, connection).await,
            VerificationStrategy::SearchThenBind {
                base_dn,
                user_filter,
                scope,
            } => {
                let base = request
                    .search_base
                    .as_ref()
                    .or(base_dn.as_ref())
                    .or(self.base_dn.as_ref())
                    .ok_or_else(|| DirectoryError::config("search-then-bind has no search base"))?;
                let template = request.search_filter.as_deref().unwrap_or(user_filter);
                self.search_then_bind(request, connection, base, template, *scope)
                    .await
            }
        }
    }

    async fn direct_bind(
        &self,
        request: &CredentialRequest,
        connection: &mut PooledConnection,
    ) -> DirectoryResult<VerificationResult> {
        let dn = match &connection.endpoint().bind_dn_template {
            Some(template) if !looks_like_dn(&request.principal) => {
                render_dn_template(template, &request.principal)
            }
            _ => request.principal.clone(),
        };

        connection.mark_unhealthy();
        match connection.bind(&dn, request.secret.expose()).await? {
            BindOutcome::Rejected => {
                debug!(endpoint = %connection.endpoint().name, "Direct bind rejected");
                Ok(VerificationResult::InvalidCredentials)
            }
            BindOutcome::Accepted => {
                let attributes = self.read_attributes(connection, &dn).await?;
                Ok(VerificationResult::Success { dn, attributes })
            }
        }
    }

    /// Reads the configured user attributes after a successful bind.
    async fn read_attributes(
        &self,
        connection: &mut PooledConnection,
        dn: &str,
    ) -> DirectoryResult<Attributes> {
        if self.user_attributes.is_empty() {
            return Ok(Attributes::new());
        }

        let query = SearchQuery::new(dn, "(objectClass=*)")
            .scope(SearchScope::Base)
            .attributes(self.user_attributes.iter().cloned());
        match connection.search_page(&query, None).await {
            Ok(page) => Ok(page
                .entries
                .into_iter()
                .next()
                .map(|entry| entry.attributes)
                .unwrap_or_default()),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                warn!(error = %e, "Could not read attributes of authenticated principal");
                Ok(Attributes::new())
            }
        }
    }

    async fn search_then_bind(
        &self,
        request: &CredentialRequest,
        connection: &mut PooledConnection,
        base: &str,
        filter_template: &str,
        scope: SearchScope,
    ) -> DirectoryResult<VerificationResult> {
        let filter = render_filter_template(filter_template, &request.principal);
        let attributes = if self.user_attributes.is_empty() {
            vec![NO_ATTRIBUTES.to_string()]
        } else {
            self.user_attributes.clone()
        };
        // Two is enough to tell a unique match from an ambiguous one.
        let query = SearchQuery::new(base, filter)
            .scope(scope)
            .attributes(attributes)
            .size_limit(2);

        let page = connection.search_page(&query, None).await?;
        let mut entries = page.entries;
        if entries.len() != 1 {
            debug!(
                endpoint = %connection.endpoint().name,
                matches = entries.len(),
                "Principal did not resolve to exactly one entry"
            );
            return Ok(VerificationResult::PrincipalNotFound);
        }
        let entry = entries.remove(0);

        connection.mark_unhealthy();
        match connection.bind(&entry.dn, request.secret.expose()).await? {
            BindOutcome::Rejected => Ok(VerificationResult::InvalidCredentials),
            BindOutcome::Accepted => Ok(VerificationResult::Success {
                dn: entry.dn,
                attributes: entry.attributes,
            }),
        }
    }
}
