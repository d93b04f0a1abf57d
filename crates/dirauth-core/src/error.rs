//! Directory error types.
//!
//! ## Security Note
//!
//! Error messages must not leak sensitive information like
//! passwords, bind credentials, or whether an account exists.

use thiserror::Error;

/// Errors that can occur during directory operations.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// Invalid configuration.
    #[error("Directory configuration error: {0}")]
    Configuration(String),

    /// Plain transport configured without explicitly allowing it.
    #[error("Security error: endpoint '{0}' uses plain LDAP. Use TLS or StartTLS, or set allow_insecure.")]
    InsecureTransport(String),

    /// The server rejected the supplied credentials.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The principal could not be resolved to exactly one entry.
    #[error("Invalid credentials")]
    PrincipalNotFound,

    /// The server could not be reached or refused service.
    #[error("Directory server unavailable: {0}")]
    ServerUnavailable(String),

    /// An established connection was reset or closed by the peer.
    #[error("Directory connection reset: {0}")]
    ConnectionReset(String),

    /// An operation exceeded its time budget.
    #[error("Directory operation timed out: {0}")]
    Timeout(String),

    /// The search filter could not be parsed.
    #[error("Malformed search filter: {0}")]
    MalformedFilter(String),

    /// No connection became available within the acquire timeout.
    #[error("Connection pool exhausted for endpoint '{endpoint}'")]
    PoolExhausted {
        /// Endpoint whose pool was exhausted.
        endpoint: String,
    },

    /// The pool has been shut down.
    #[error("Connection pool is closed")]
    PoolClosed,

    /// The server truncated a result set.
    #[error("Search returned partial results ({received} entries received)")]
    PartialResult {
        /// Number of entries received before truncation.
        received: usize,
    },

    /// Every candidate endpoint has been tried or excluded.
    #[error("No directory server available")]
    NoCandidates,

    /// The entry does not exist.
    #[error("No such entry: {0}")]
    NoSuchEntry(String),

    /// Write attempted while the directory is configured read-only.
    #[error("Directory is read-only: cannot {0}")]
    ReadOnly(String),

    /// A write was sent but its outcome could not be observed.
    #[error("Outcome of {operation} is unknown: {reason}")]
    Indeterminate {
        /// Operation that was in flight.
        operation: String,
        /// Underlying failure.
        reason: String,
    },

    /// TLS negotiation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server answered with an unexpected result code.
    #[error("LDAP protocol error (code {code}): {message}")]
    Protocol {
        /// LDAP result code.
        code: u32,
        /// Diagnostic message from the server.
        message: String,
    },

    /// Internal error.
    #[error("Internal directory error: {0}")]
    Internal(String),
}

impl DirectoryError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a server unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServerUnavailable(msg.into())
    }

    /// Creates a timeout error for the named operation.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout(operation.into())
    }

    /// Creates a protocol error.
    #[must_use]
    pub fn protocol(code: u32, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    /// Returns true when retrying against another server may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ServerUnavailable(_) | Self::ConnectionReset(_) | Self::Timeout(_)
        )
    }

    /// Checks if this is an authentication failure.
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self, Self::InvalidCredentials | Self::PrincipalNotFound)
    }

    /// Returns true when the connection that produced this error must not be reused.
    #[must_use]
    pub const fn poisons_connection(&self) -> bool {
        matches!(
            self,
            Self::ServerUnavailable(_)
                | Self::ConnectionReset(_)
                | Self::Timeout(_)
                | Self::Tls(_)
                | Self::Indeterminate { .. }
        )
    }

    /// Converts a transient failure of an already-sent write into
    /// [`DirectoryError::Indeterminate`] so it is never retried.
    #[must_use]
    pub fn into_write_error(self, operation: &str) -> Self {
        if self.is_transient() {
            Self::Indeterminate {
                operation: operation.to_string(),
                reason: self.to_string(),
            }
        } else {
            self
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
