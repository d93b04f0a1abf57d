//! Directory configuration.
//!
//! ## Security Requirements
//!
//! - Endpoints default to LDAPS (TLS from connection start)
//! - Plain `ldap://` endpoints are rejected unless `allow_insecure` is set
//! - The service account password is never serialized

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, DirectoryResult};
use crate::filter::USERNAME_PLACEHOLDER;
use crate::model::{SearchScope, Secret};

// ============================================================================
// Endpoints
// ============================================================================

/// Transport security for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportSecurity {
    /// Cleartext LDAP. Credentials travel unencrypted.
    Plain,
    /// LDAPS: TLS from connection start.
    #[default]
    Tls,
    /// Plain connection upgraded with the StartTLS extended operation.
    StartTls,
}

impl TransportSecurity {
    /// Returns the conventional port for this mode.
    #[must_use]
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::Tls => 636,
            Self::Plain | Self::StartTls => 389,
        }
    }

    /// Returns the URL scheme for this mode.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        match self {
            Self::Tls => "ldaps",
            Self::Plain | Self::StartTls => "ldap",
        }
    }

    /// Returns true if credentials are encrypted on the wire.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        !matches!(self, Self::Plain)
    }
}

fn default_weight() -> u32 {
    1
}

const fn default_connect_timeout_ms() -> u64 {
    5_000
}

const fn default_read_timeout_ms() -> u64 {
    30_000
}

const fn default_true() -> bool {
    true
}

/// A directory server the core may talk to.
///
/// Endpoints are immutable once loaded. Lower `priority` values are tried
/// first; ties keep configuration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    /// Unique name, used as the endpoint key in logs and pool bookkeeping.
    pub name: String,

    /// Host name or address.
    pub host: String,

    /// Port; defaults to the transport's conventional port.
    #[serde(default)]
    pub port: Option<u16>,

    /// Transport security mode.
    #[serde(default)]
    pub security: TransportSecurity,

    /// Failover priority (lower first).
    #[serde(default)]
    pub priority: u32,

    /// Weight for weighted round-robin selection.
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Bind DN template for direct bind, e.g. `uid={username},ou=people,dc=example,dc=com`.
    #[serde(default)]
    pub bind_dn_template: Option<String>,

    /// Connection establishment timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-operation read timeout in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Whether to validate server certificates.
    /// Should always be true in production.
    #[serde(default = "default_true")]
    pub verify_certificates: bool,
}

impl ServerEndpoint {
    /// Creates an LDAPS endpoint with default timeouts.
    #[must_use]
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: None,
            security: TransportSecurity::Tls,
            priority: 0,
            weight: default_weight(),
            bind_dn_template: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            verify_certificates: true,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the transport security mode.
    #[must_use]
    pub const fn with_security(mut self, security: TransportSecurity) -> Self {
        self.security = security;
        self
    }

    /// Sets the failover priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the round-robin weight.
    #[must_use]
    pub const fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Sets the bind DN template.
    #[must_use]
    pub fn with_bind_dn_template(mut self, template: impl Into<String>) -> Self {
        self.bind_dn_template = Some(template.into());
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets whether certificates are validated.
    #[must_use]
    pub const fn with_verify_certificates(mut self, verify: bool) -> Self {
        self.verify_certificates = verify;
        self
    }

    /// Returns the endpoint key.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.name
    }

    /// Returns the effective port.
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.security.default_port())
    }

    /// Returns the connection URL.
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.security.scheme(),
            self.host,
            self.effective_port()
        )
    }

    /// Returns the connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the read timeout.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

// ============================================================================
// Pool, selection and retry
// ============================================================================

/// Connection pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum concurrent connections per endpoint.
    pub max_per_endpoint: usize,

    /// Idle connections not validated for this long are validated before reuse.
    pub idle_lifetime_ms: u64,

    /// Connections older than this are closed instead of reused.
    pub max_lifetime_ms: Option<u64>,

    /// How long `acquire` waits for a free slot.
    pub acquire_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_per_endpoint: 10,
            idle_lifetime_ms: 60_000,
            max_lifetime_ms: None,
            acquire_timeout_ms: 5_000,
        }
    }
}

impl PoolSettings {
    /// Returns the idle lifetime.
    #[must_use]
    pub const fn idle_lifetime(&self) -> Duration {
        Duration::from_millis(self.idle_lifetime_ms)
    }

    /// Returns the maximum connection lifetime.
    #[must_use]
    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_ms.map(Duration::from_millis)
    }

    /// Returns the acquire timeout.
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// How the selector orders candidate endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Strict priority order.
    #[default]
    Priority,
    /// Smooth weighted round-robin over endpoint weights.
    WeightedRoundRobin,
}

/// When a failed request moves on to another endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverMode {
    /// Retry the same request against the next candidate.
    #[default]
    Transparent,
    /// Fail the request; later requests avoid the failed endpoint.
    NextRequest,
}

/// Retry and deadline policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum attempts per logical request.
    pub max_attempts: u32,

    /// Time budget for a single attempt.
    pub attempt_timeout_ms: u64,

    /// Time budget for the whole request.
    pub deadline_ms: u64,

    /// Delay before the first retry; 0 retries immediately.
    pub backoff_ms: u64,

    /// Multiplier applied to the delay after each retry.
    pub backoff_multiplier: f64,

    /// Failover behaviour.
    pub failover: FailoverMode,

    /// How long a failed endpoint is demoted behind healthy ones.
    ///
    /// Must be positive with [`FailoverMode::NextRequest`], which relies on
    /// the demotion to move later requests.
    pub failure_cooldown_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout_ms: 10_000,
            deadline_ms: 30_000,
            backoff_ms: 0,
            backoff_multiplier: 2.0,
            failover: FailoverMode::Transparent,
            failure_cooldown_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Returns the per-attempt timeout.
    #[must_use]
    pub const fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Returns the overall deadline.
    #[must_use]
    pub const fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Returns the failure cooldown.
    #[must_use]
    pub const fn failure_cooldown(&self) -> Duration {
        Duration::from_millis(self.failure_cooldown_ms)
    }

    /// Delay before retry number `retry` (0-indexed).
    #[must_use]
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        if self.backoff_ms == 0 {
            return Duration::ZERO;
        }
        #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
        let factor = self.backoff_multiplier.max(1.0).powi(retry.min(16) as i32);
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let delay_ms = (self.backoff_ms as f64 * factor).min(self.deadline_ms as f64) as u64;
        Duration::from_millis(delay_ms)
    }
}

// ============================================================================
// Verification
// ============================================================================

/// Service account used for searches and search-then-bind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccount {
    /// Bind DN.
    pub bind_dn: String,

    /// Bind password; not serialized, and empty when absent from the input.
    #[serde(default, skip_serializing)]
    pub password: Secret,
}

fn default_user_filter() -> String {
    "(uid={username})".to_string()
}

/// How credentials are checked against the directory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerificationStrategy {
    /// Bind directly as the principal.
    #[default]
    DirectBind,

    /// Resolve the principal's DN with the service account, then bind as it.
    SearchThenBind {
        /// Search base; falls back to the directory base DN.
        #[serde(default)]
        base_dn: Option<String>,

        /// User filter with a `{username}` placeholder.
        #[serde(default = "default_user_filter")]
        user_filter: String,

        /// Search scope.
        #[serde(default)]
        scope: SearchScope,
    },
}

/// Whether the directory may be written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditMode {
    /// Writes are rejected locally.
    #[default]
    ReadOnly,
    /// Add, modify and delete are allowed.
    Writable,
}

impl EditMode {
    /// Returns true if the mode allows writes.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        matches!(self, Self::Writable)
    }
}

// ============================================================================
// Directory configuration
// ============================================================================

fn default_page_size() -> u32 {
    500
}

fn default_failure_delay_floor_ms() -> u64 {
    250
}

/// Complete configuration of the directory core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Endpoints in configuration order.
    pub endpoints: Vec<ServerEndpoint>,

    /// Pool sizing.
    #[serde(default)]
    pub pool: PoolSettings,

    /// Endpoint selection mode.
    #[serde(default)]
    pub selection: SelectionMode,

    /// Retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Verification strategy.
    #[serde(default)]
    pub strategy: VerificationStrategy,

    /// Service account; pooled connections bind as it when present.
    #[serde(default)]
    pub service_account: Option<ServiceAccount>,

    /// Default base DN for searches and browsing.
    #[serde(default)]
    pub base_dn: Option<String>,

    /// Attributes returned with a successful verification.
    #[serde(default)]
    pub user_attributes: Vec<String>,

    /// Edit mode.
    #[serde(default)]
    pub edit_mode: EditMode,

    /// Allow plain (unencrypted) endpoints.
    #[serde(default)]
    pub allow_insecure: bool,

    /// Minimum latency of a failed verification, in milliseconds.
    #[serde(default = "default_failure_delay_floor_ms")]
    pub failure_delay_floor_ms: u64,

    /// Default page size for searches that do not set one; 0 disables
    /// paging for them.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl DirectoryConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> DirectoryConfigBuilder {
        DirectoryConfigBuilder::new()
    }

    /// Returns the failure latency floor.
    #[must_use]
    pub const fn failure_delay_floor(&self) -> Duration {
        Duration::from_millis(self.failure_delay_floor_ms)
    }

    /// Returns the endpoint with the given name.
    #[must_use]
    pub fn endpoint(&self, name: &str) -> Option<&ServerEndpoint> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    /// Validates the configuration.
    ///
    /// ## Security
    ///
    /// Plain endpoints are rejected unless `allow_insecure` is set.
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.endpoints.is_empty() {
            return Err(DirectoryError::config("at least one endpoint is required"));
        }

        let mut names = HashSet::new();
        for endpoint in &self.endpoints {
            self.validate_endpoint(endpoint)?;
            if !names.insert(endpoint.name.as_str()) {
                return Err(DirectoryError::config(format!(
                    "duplicate endpoint name '{}'",
                    endpoint.name
                )));
            }
        }

        if self.pool.max_per_endpoint == 0 {
            return Err(DirectoryError::config("pool.max_per_endpoint must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(DirectoryError::config("retry.max_attempts must be at least 1"));
        }
        if self.retry.attempt_timeout_ms == 0 || self.retry.deadline_ms == 0 {
            return Err(DirectoryError::config("retry timeouts must be positive"));
        }
        if self.retry.failover == FailoverMode::NextRequest && self.retry.failure_cooldown_ms == 0 {
            return Err(DirectoryError::config(
                "next-request failover needs a positive retry.failure_cooldown_ms",
            ));
        }
        if self.selection == SelectionMode::WeightedRoundRobin
            && self.endpoints.iter().all(|e| e.weight == 0)
        {
            return Err(DirectoryError::config(
                "weighted round-robin needs at least one endpoint with a positive weight",
            ));
        }

        if let Some(account) = &self.service_account {
            if account.bind_dn.trim().is_empty() {
                return Err(DirectoryError::config("service_account.bind_dn cannot be empty"));
            }
            if account.password.is_empty() {
                return Err(DirectoryError::config("service_account.password cannot be empty"));
            }
        }

        if let VerificationStrategy::SearchThenBind {
            base_dn,
            user_filter,
            ..
        } = &self.strategy
        {
            if self.service_account.is_none() {
                return Err(DirectoryError::config(
                    "search-then-bind requires a service account",
                ));
            }
            if base_dn.as_ref().or(self.base_dn.as_ref()).is_none() {
                return Err(DirectoryError::config(
                    "search-then-bind requires a base DN",
                ));
            }
            if !user_filter.contains(USERNAME_PLACEHOLDER) {
                return Err(DirectoryError::config(format!(
                    "user_filter must contain {USERNAME_PLACEHOLDER}"
                )));
            }
        }

        Ok(())
    }

    fn validate_endpoint(&self, endpoint: &ServerEndpoint) -> DirectoryResult<()> {
        if endpoint.name.trim().is_empty() {
            return Err(DirectoryError::config("endpoint name cannot be empty"));
        }
        if endpoint.host.trim().is_empty() {
            return Err(DirectoryError::config(format!(
                "endpoint '{}' is missing a host",
                endpoint.name
            )));
        }
        if endpoint.port == Some(0) {
            return Err(DirectoryError::config(format!(
                "endpoint '{}' has an invalid port",
                endpoint.name
            )));
        }
        if !endpoint.security.is_encrypted() && !self.allow_insecure {
            return Err(DirectoryError::InsecureTransport(endpoint.name.clone()));
        }
        if endpoint.connect_timeout_ms == 0 || endpoint.read_timeout_ms == 0 {
            return Err(DirectoryError::config(format!(
                "endpoint '{}' timeouts must be positive",
                endpoint.name
            )));
        }
        if let Some(template) = &endpoint.bind_dn_template {
            if !template.contains(USERNAME_PLACEHOLDER) {
                return Err(DirectoryError::config(format!(
                    "endpoint '{}' bind_dn_template must contain {USERNAME_PLACEHOLDER}",
                    endpoint.name
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for directory configuration.
#[derive(Debug)]
pub struct DirectoryConfigBuilder {
    config: DirectoryConfig,
}

impl Default for DirectoryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryConfigBuilder {
    /// Creates a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: DirectoryConfig {
                endpoints: Vec::new(),
                pool: PoolSettings::default(),
                selection: SelectionMode::default(),
                retry: RetryPolicy::default(),
                strategy: VerificationStrategy::default(),
                service_account: None,
                base_dn: None,
                user_attributes: Vec::new(),
                edit_mode: EditMode::default(),
                allow_insecure: false,
                failure_delay_floor_ms: default_failure_delay_floor_ms(),
                page_size: default_page_size(),
            },
        }
    }

    /// Appends an endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: ServerEndpoint) -> Self {
        self.config.endpoints.push(endpoint);
        self
    }

    /// Sets the pool settings.
    #[must_use]
    pub fn pool(mut self, pool: PoolSettings) -> Self {
        self.config.pool = pool;
        self
    }

    /// Sets the maximum connections per endpoint.
    #[must_use]
    pub const fn max_connections_per_endpoint(mut self, max: usize) -> Self {
        self.config.pool.max_per_endpoint = max;
        self
    }

    /// Sets the pool acquire timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool.acquire_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the idle lifetime after which connections are validated.
    #[must_use]
    pub fn idle_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.pool.idle_lifetime_ms = duration_ms(lifetime);
        self
    }

    /// Sets the selection mode.
    #[must_use]
    pub const fn selection(mut self, mode: SelectionMode) -> Self {
        self.config.selection = mode;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Sets the verification strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: VerificationStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Sets the service account.
    #[must_use]
    pub fn service_account(mut self, bind_dn: impl Into<String>, password: impl Into<Secret>) -> Self {
        self.config.service_account = Some(ServiceAccount {
            bind_dn: bind_dn.into(),
            password: password.into(),
        });
        self
    }

    /// Sets the default base DN.
    #[must_use]
    pub fn base_dn(mut self, dn: impl Into<String>) -> Self {
        self.config.base_dn = Some(dn.into());
        self
    }

    /// Sets the attributes returned with a successful verification.
    #[must_use]
    pub fn user_attributes<S: Into<String>>(mut self, attrs: impl IntoIterator<Item = S>) -> Self {
        self.config.user_attributes = attrs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the edit mode.
    #[must_use]
    pub const fn edit_mode(mut self, mode: EditMode) -> Self {
        self.config.edit_mode = mode;
        self
    }

    /// Allows plain endpoints.
    #[must_use]
    pub const fn allow_insecure(mut self, allow: bool) -> Self {
        self.config.allow_insecure = allow;
        self
    }

    /// Sets the failure latency floor.
    #[must_use]
    pub fn failure_delay_floor(mut self, floor: Duration) -> Self {
        self.config.failure_delay_floor_ms = duration_ms(floor);
        self
    }

    /// Sets the default page size.
    #[must_use]
    pub const fn page_size(mut self, size: u32) -> Self {
        self.config.page_size = size;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> DirectoryResult<DirectoryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(name: &str) -> ServerEndpoint {
        ServerEndpoint::new(name, format!("{name}.example.com"))
    }

    #[test]
    fn rejects_plain_endpoint_by_default() {
        let result = DirectoryConfig::builder()
            .endpoint(endpoint("primary").with_security(TransportSecurity::Plain))
            .build();

        assert!(matches!(result, Err(DirectoryError::InsecureTransport(name)) if name == "primary"));
    }

    #[test]
    fn accepts_plain_endpoint_when_allowed() {
        let config = DirectoryConfig::builder()
            .endpoint(endpoint("primary").with_security(TransportSecurity::Plain))
            .allow_insecure(true)
            .build()
            .unwrap();

        assert_eq!(config.endpoints[0].url(), "ldap://primary.example.com:389");
    }

    #[test]
    fn endpoint_urls() {
        assert_eq!(endpoint("a").url(), "ldaps://a.example.com:636");
        assert_eq!(
            endpoint("b")
                .with_security(TransportSecurity::StartTls)
                .url(),
            "ldap://b.example.com:389"
        );
        assert_eq!(endpoint("c").with_port(3269).url(), "ldaps://c.example.com:3269");
    }

    #[test]
    fn rejects_duplicate_names() {
        let result = DirectoryConfig::builder()
            .endpoint(endpoint("primary"))
            .endpoint(endpoint("primary"))
            .build();

        assert!(matches!(result, Err(DirectoryError::Configuration(_))));
    }

    #[test]
    fn requires_an_endpoint() {
        assert!(DirectoryConfig::builder().build().is_err());
    }

    #[test]
    fn search_then_bind_requires_service_account_and_base() {
        let strategy = VerificationStrategy::SearchThenBind {
            base_dn: None,
            user_filter: default_user_filter(),
            scope: SearchScope::Subtree,
        };

        let missing_account = DirectoryConfig::builder()
            .endpoint(endpoint("primary"))
            .strategy(strategy.clone())
            .base_dn("dc=example,dc=com")
            .build();
        assert!(missing_account.is_err());

        let missing_base = DirectoryConfig::builder()
            .endpoint(endpoint("primary"))
            .strategy(strategy.clone())
            .service_account("cn=svc,dc=example,dc=com", "secret")
            .build();
        assert!(missing_base.is_err());

        let ok = DirectoryConfig::builder()
            .endpoint(endpoint("primary"))
            .strategy(strategy)
            .service_account("cn=svc,dc=example,dc=com", "secret")
            .base_dn("dc=example,dc=com")
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn next_request_failover_needs_cooldown() {
        let build = |cooldown_ms| {
            DirectoryConfig::builder()
                .endpoint(endpoint("a"))
                .endpoint(endpoint("b"))
                .retry(RetryPolicy {
                    failover: FailoverMode::NextRequest,
                    failure_cooldown_ms: cooldown_ms,
                    ..RetryPolicy::default()
                })
                .build()
        };

        assert!(matches!(build(0), Err(DirectoryError::Configuration(_))));
        assert!(build(1_000).is_ok());
    }

    #[test]
    fn bind_template_needs_placeholder() {
        let result = DirectoryConfig::builder()
            .endpoint(endpoint("primary").with_bind_dn_template("uid=fixed,dc=example,dc=com"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn service_password_is_not_serialized() {
        let config = DirectoryConfig::builder()
            .endpoint(endpoint("primary"))
            .service_account("cn=svc,dc=example,dc=com", "top-secret")
            .build()
            .unwrap();

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("top-secret"));
        assert!(json.contains("cn=svc"));
    }

    #[test]
    fn service_account_without_password_loads_but_is_invalid() {
        let config: DirectoryConfig = serde_json::from_str(
            r#"{
                "endpoints": [{ "name": "primary", "host": "ldap.example.com" }],
                "service_account": { "bind_dn": "cn=svc" }
            }"#,
        )
        .unwrap();

        assert!(config.service_account.as_ref().unwrap().password.is_empty());
        assert!(matches!(config.validate(), Err(DirectoryError::Configuration(_))));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: DirectoryConfig = serde_json::from_str(
            r#"{
                "endpoints": [{ "name": "primary", "host": "ldap.example.com" }],
                "strategy": { "type": "search_then_bind" },
                "service_account": { "bind_dn": "cn=svc", "password": "pw" },
                "base_dn": "dc=example,dc=com"
            }"#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.pool.max_per_endpoint, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.endpoints[0].weight, 1);
        assert!(matches!(
            config.strategy,
            VerificationStrategy::SearchThenBind { ref user_filter, .. } if user_filter == "(uid={username})"
        ));
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy {
            backoff_ms: 100,
            backoff_multiplier: 2.0,
            deadline_ms: 1_000,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(10), Duration::from_millis(1_000));
        assert_eq!(RetryPolicy::default().backoff_delay(3), Duration::ZERO);
    }
}
