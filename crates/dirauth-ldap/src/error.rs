//! Mapping of `ldap3` failures and LDAP result codes onto [`DirectoryError`].
//!
//! ## Security Note
//!
//! Server diagnostic text is passed through for protocol errors only.
//! Bind failures never carry it, so messages cannot reveal whether an
//! account exists.

use dirauth_core::DirectoryError;
use ldap3::LdapError;

/// LDAP result codes the backend acts on (RFC 4511, appendix A).
pub mod rc {
    /// Operation completed.
    pub const SUCCESS: u32 = 0;
    /// Server time limit reached before the search finished.
    pub const TIME_LIMIT_EXCEEDED: u32 = 3;
    /// Server size limit reached before the search finished.
    pub const SIZE_LIMIT_EXCEEDED: u32 = 4;
    /// Administrative limit reached.
    pub const ADMIN_LIMIT_EXCEEDED: u32 = 11;
    /// Base or target entry does not exist.
    pub const NO_SUCH_OBJECT: u32 = 32;
    /// Wrong DN or password.
    pub const INVALID_CREDENTIALS: u32 = 49;
    /// Server is too busy to answer.
    pub const BUSY: u32 = 51;
    /// Server is shutting down or otherwise unavailable.
    pub const UNAVAILABLE: u32 = 52;
    /// Entry already exists.
    pub const ENTRY_ALREADY_EXISTS: u32 = 68;
    /// Server closed the connection after an unsolicited notice.
    pub const OTHER: u32 = 80;
    /// Filter could not be encoded or parsed.
    pub const FILTER_ERROR: u32 = 87;
}

/// Returns true for codes that end a search early with valid partial results.
#[must_use]
pub const fn is_truncation(code: u32) -> bool {
    matches!(
        code,
        rc::TIME_LIMIT_EXCEEDED | rc::SIZE_LIMIT_EXCEEDED | rc::ADMIN_LIMIT_EXCEEDED
    )
}

/// Converts a non-success result code into an error.
#[must_use]
pub fn from_result_code(code: u32, text: &str, target: &str) -> DirectoryError {
    match code {
        rc::NO_SUCH_OBJECT => DirectoryError::NoSuchEntry(target.to_string()),
        rc::INVALID_CREDENTIALS => DirectoryError::InvalidCredentials,
        rc::BUSY | rc::UNAVAILABLE => {
            DirectoryError::unavailable(format!("server answered with code {code}"))
        }
        rc::FILTER_ERROR => DirectoryError::MalformedFilter(text.to_string()),
        _ => DirectoryError::protocol(code, text),
    }
}

/// Converts an `ldap3` error raised on an established connection.
#[must_use]
pub fn classify(err: LdapError, operation: &str) -> DirectoryError {
    match err {
        LdapError::FilterParsing => DirectoryError::MalformedFilter(format!("{operation}: filter could not be parsed")),
        LdapError::Timeout { .. } => DirectoryError::timeout(operation),
        LdapError::LdapResult { result } => from_result_code(result.rc, &result.text, operation),
        LdapError::Io { source } => DirectoryError::ConnectionReset(format!("{operation}: {source}")),
        LdapError::EndOfStream | LdapError::OpSend { .. } | LdapError::ResultRecv { .. } => {
            DirectoryError::ConnectionReset(format!("{operation}: connection closed"))
        }
        other => DirectoryError::Internal(format!("{operation}: {other}")),
    }
}

/// Converts an `ldap3` error raised while connecting.
#[must_use]
pub fn classify_connect(err: LdapError, url: &str) -> DirectoryError {
    match err {
        LdapError::UrlParsing { .. } | LdapError::UnknownScheme(_) => {
            DirectoryError::config(format!("invalid directory URL {url}"))
        }
        LdapError::Timeout { .. } => DirectoryError::timeout(format!("connect to {url}")),
        other => DirectoryError::unavailable(format!("{url}: {other}")),
    }
}
