//! Command implementations.

pub mod browse;
pub mod config;
pub mod edit;
pub mod search;
pub mod test;
pub mod verify;

pub use browse::{run_children, run_entry};
pub use config::run_config;
pub use edit::{run_add, run_delete, run_modify};
pub use search::run_search;
pub use test::run_test;
pub use verify::run_verify;

use std::sync::Arc;

use dirauth_core::{DirectoryConfig, DirectoryService};
use dirauth_ldap::Ldap3Connector;
use tracing::debug;

/// Opens a directory service for a profile.
pub fn connect(name: &str, profile: &DirectoryConfig) -> crate::CliResult<DirectoryService> {
    debug!(profile = name, endpoints = profile.endpoints.len(), "Opening directory service");
    Ok(DirectoryService::new(
        profile.clone(),
        Arc::new(Ldap3Connector::new()),
    )?)
}

/// Resolves a DN argument against the profile's base DN.
///
/// `-` stands for the base DN itself.
fn resolve_dn(dn: &str, profile: &DirectoryConfig) -> crate::CliResult<String> {
    if dn != "-" {
        return Ok(dn.to_string());
    }
    profile
        .base_dn
        .clone()
        .ok_or_else(|| crate::CliError::InvalidArgument("profile has no base_dn".to_string()))
}
