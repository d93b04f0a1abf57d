//! Request, result and entry types shared by every directory component.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Multi-valued text attributes keyed by attribute name.
pub type Attributes = BTreeMap<String, Vec<String>>;

// ============================================================================
// Secrets
// ============================================================================

/// A password or bind credential that is wiped from memory on drop.
///
/// `Debug` output is redacted and the value is never serialized.
#[derive(Clone, Default, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret {
    inner: String,
}

impl Secret {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// Exposes the secret for the duration of a bind.
    ///
    /// The returned value must not be stored or logged.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.inner
    }

    /// Returns true if the secret is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// Credential verification
// ============================================================================

/// Credentials submitted for verification.
#[derive(Debug)]
pub struct CredentialRequest {
    /// Username or full DN.
    pub principal: String,

    /// Password supplied by the user.
    pub secret: Secret,

    /// Overrides the configured search base (search-then-bind only).
    pub search_base: Option<String>,

    /// Overrides the configured user filter (search-then-bind only).
    ///
    /// `{username}` is replaced with the escaped principal.
    pub search_filter: Option<String>,
}

impl CredentialRequest {
    /// Creates a request for a principal and secret.
    #[must_use]
    pub fn new(principal: impl Into<String>, secret: impl Into<Secret>) -> Self {
        Self {
            principal: principal.into(),
            secret: secret.into(),
            search_base: None,
            search_filter: None,
        }
    }

    /// Sets the search base override.
    #[must_use]
    pub fn with_search_base(mut self, base: impl Into<String>) -> Self {
        self.search_base = Some(base.into());
        self
    }

    /// Sets the user filter override.
    #[must_use]
    pub fn with_search_filter(mut self, filter: impl Into<String>) -> Self {
        self.search_filter = Some(filter.into());
        self
    }
}

/// Outcome of a credential verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationResult {
    /// The credentials are valid.
    Success {
        /// DN the principal resolved to.
        dn: String,
        /// Attributes read for the principal.
        attributes: Attributes,
    },

    /// The server rejected the credentials.
    InvalidCredentials,

    /// The principal did not resolve to exactly one entry.
    PrincipalNotFound,

    /// No server could be reached.
    ServerUnavailable,

    /// The request ran out of time.
    Timeout,
}

impl VerificationResult {
    /// Returns true for [`VerificationResult::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns true for outcomes caused by the supplied credentials.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::InvalidCredentials | Self::PrincipalNotFound)
    }

    /// Message safe to show to the person who typed the credentials.
    ///
    /// Unknown principals and wrong passwords read the same.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::Success { .. } => "Authentication succeeded",
            Self::InvalidCredentials | Self::PrincipalNotFound => "Invalid username or password",
            Self::ServerUnavailable => "Directory service unavailable",
            Self::Timeout => "Directory service timed out",
        }
    }
}

// ============================================================================
// Entries and queries
// ============================================================================

/// A directory entry with parsed attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished Name.
    pub dn: String,

    /// Text attributes (all values are multi-valued).
    #[serde(default)]
    pub attributes: Attributes,

    /// Binary attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub binary_attributes: BTreeMap<String, Vec<Vec<u8>>>,
}

impl DirectoryEntry {
    /// Creates an entry without attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            ..Self::default()
        }
    }

    /// Adds a text value to an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Gets the first value of an attribute, matching names case-insensitively.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Gets all values of an attribute, matching names case-insensitively.
    #[must_use]
    pub fn values(&self, name: &str) -> Option<&Vec<String>> {
        self.attributes.get(name).or_else(|| {
            self.attributes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    /// Checks if the entry has a text or binary attribute.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.values(name).is_some()
            || self
                .binary_attributes
                .keys()
                .any(|k| k.eq_ignore_ascii_case(name))
    }

    /// Keeps only the requested attributes (`*` keeps all user attributes).
    #[must_use]
    pub fn project(mut self, requested: &[String]) -> Self {
        if requested.is_empty() || requested.iter().any(|a| a == "*") {
            return self;
        }
        let wanted = |k: &String| requested.iter().any(|r| r.eq_ignore_ascii_case(k));
        self.attributes.retain(|k, _| wanted(k));
        self.binary_attributes.retain(|k, _| wanted(k));
        self
    }
}

/// Search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchScope {
    /// Search only the base DN.
    Base,
    /// Search one level below the base DN.
    OneLevel,
    /// Search the entire subtree.
    #[default]
    Subtree,
}

/// A directory query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Base DN.
    pub base_dn: String,

    /// Filter expression (RFC 4515).
    pub filter: String,

    /// Attributes to return; empty means all user attributes.
    #[serde(default)]
    pub attributes: Vec<String>,

    /// Search scope.
    #[serde(default)]
    pub scope: SearchScope,

    /// Entries requested per page; 0 uses the directory's configured page
    /// size.
    #[serde(default)]
    pub page_size: u32,

    /// Server-side size limit; 0 means no client-requested limit.
    #[serde(default)]
    pub size_limit: u32,
}

impl SearchQuery {
    /// Creates a subtree query returning all user attributes.
    #[must_use]
    pub fn new(base_dn: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            filter: filter.into(),
            attributes: Vec::new(),
            scope: SearchScope::Subtree,
            page_size: 0,
            size_limit: 0,
        }
    }

    /// Sets the search scope.
    #[must_use]
    pub const fn scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the returned attributes.
    #[must_use]
    pub fn attributes<S: Into<String>>(mut self, attrs: impl IntoIterator<Item = S>) -> Self {
        self.attributes = attrs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the size limit.
    #[must_use]
    pub const fn size_limit(mut self, limit: u32) -> Self {
        self.size_limit = limit;
        self
    }
}

// ============================================================================
// Modifications
// ============================================================================

/// A single attribute change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Modification {
    /// Add values to an attribute.
    Add {
        /// Attribute name.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Replace all values of an attribute.
    Replace {
        /// Attribute name.
        attribute: String,
        /// New values.
        values: Vec<String>,
    },
    /// Delete values, or the whole attribute when `values` is empty.
    Delete {
        /// Attribute name.
        attribute: String,
        /// Values to delete.
        values: Vec<String>,
    },
}

impl Modification {
    /// Returns the attribute the modification applies to.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Add { attribute, .. }
            | Self::Replace { attribute, .. }
            | Self::Delete { attribute, .. } => attribute,
        }
    }
}
