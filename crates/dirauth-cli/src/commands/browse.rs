//! Directory browsing commands.

use dirauth_core::DirectoryConfig;

use crate::config::OutputFormat;
use crate::output::{output_entries, warning};
use crate::CliError;

/// Lists the immediate children of an entry.
pub async fn run_children(
    dn: &str,
    name: &str,
    profile: &DirectoryConfig,
    format: OutputFormat,
) -> crate::CliResult<()> {
    let dn = super::resolve_dn(dn, profile)?;
    let service = super::connect(name, profile)?;
    let outcome = service.children(&dn).await;
    service.shutdown().await;
    let outcome = outcome?;

    output_entries(&outcome.entries, format)?;
    if outcome.partial {
        warning(&format!(
            "Server truncated the listing after {} entries",
            outcome.entries.len()
        ));
    }
    Ok(())
}

/// Shows a single entry.
pub async fn run_entry(
    dn: &str,
    name: &str,
    profile: &DirectoryConfig,
    format: OutputFormat,
) -> crate::CliResult<()> {
    let dn = super::resolve_dn(dn, profile)?;
    let service = super::connect(name, profile)?;
    let entry = service.entry(&dn).await;
    service.shutdown().await;

    match entry? {
        Some(entry) => output_entries(&[entry], format),
        None => Err(CliError::NotFound {
            resource_type: "entry".to_string(),
            id: dn,
        }),
    }
}
