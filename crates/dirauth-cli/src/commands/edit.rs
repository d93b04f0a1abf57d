//! Entry editing commands.
//!
//! Every command here needs a profile with `edit_mode = "writable"`.

use std::collections::BTreeMap;

use dirauth_core::{DirectoryConfig, DirectoryEntry};

use crate::output::{confirm, error, info, success};
use crate::CliError;

/// Splits a `name=value` argument.
fn parse_assignment(arg: &str) -> crate::CliResult<(String, String)> {
    match arg.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(CliError::InvalidArgument(format!(
            "expected name=value, got '{arg}'"
        ))),
    }
}

/// Builds a new entry from `name=value` arguments; repeated names add values.
fn build_entry(dn: &str, attrs: &[String]) -> crate::CliResult<DirectoryEntry> {
    let mut entry = DirectoryEntry::new(dn);
    for arg in attrs {
        let (name, value) = parse_assignment(arg)?;
        entry = entry.with_attr(name, value);
    }
    Ok(entry)
}

/// Returns the entry's own spelling of an attribute name.
fn attribute_key(entry: &DirectoryEntry, name: &str) -> String {
    entry
        .attributes
        .keys()
        .find(|key| key.eq_ignore_ascii_case(name))
        .cloned()
        .unwrap_or_else(|| name.to_string())
}

/// Applies `--set` and `--clear` edits to a copy of `original`.
///
/// Every `--set` name has its values replaced by the ones given. Names
/// match case-insensitively.
fn apply_edits(
    original: &DirectoryEntry,
    set: &[String],
    clear: &[String],
) -> crate::CliResult<DirectoryEntry> {
    let mut replacements: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for arg in set {
        let (name, value) = parse_assignment(arg)?;
        replacements
            .entry(attribute_key(original, &name))
            .or_default()
            .push(value);
    }

    let cleared: Vec<String> = clear.iter().map(|name| attribute_key(original, name)).collect();
    if let Some(name) = cleared.iter().find(|name| {
        replacements
            .keys()
            .any(|key| key.eq_ignore_ascii_case(name))
    }) {
        return Err(CliError::InvalidArgument(format!(
            "attribute '{name}' is both set and cleared"
        )));
    }

    let mut modified = original.clone();
    for name in &cleared {
        modified.attributes.remove(name);
    }
    modified.attributes.extend(replacements);
    Ok(modified)
}

/// Adds an entry.
pub async fn run_add(
    dn: &str,
    attrs: &[String],
    name: &str,
    profile: &DirectoryConfig,
) -> crate::CliResult<()> {
    let entry = build_entry(dn, attrs)?;
    let service = super::connect(name, profile)?;
    let result = service.add_entry(&entry).await;
    service.shutdown().await;
    result?;

    success(&format!("Entry '{dn}' added"));
    Ok(())
}

/// Changes attributes of an existing entry.
///
/// A single `--set` replaces that attribute directly; anything else is
/// written as the difference against the current entry.
pub async fn run_modify(
    dn: &str,
    set: &[String],
    clear: &[String],
    name: &str,
    profile: &DirectoryConfig,
) -> crate::CliResult<()> {
    if set.is_empty() && clear.is_empty() {
        return Err(CliError::InvalidArgument(
            "nothing to change; pass --set or --clear".to_string(),
        ));
    }

    let service = super::connect(name, profile)?;
    let result = modify_entry(&service, dn, set, clear).await;
    service.shutdown().await;

    match result? {
        0 => info(&format!("Entry '{dn}' already up to date")),
        changes => success(&format!("Entry '{dn}' updated ({changes} changes)")),
    }
    Ok(())
}

async fn modify_entry(
    service: &dirauth_core::DirectoryService,
    dn: &str,
    set: &[String],
    clear: &[String],
) -> crate::CliResult<usize> {
    if let ([single], []) = (set, clear) {
        let (attribute, value) = parse_assignment(single)?;
        service.modify_attribute(dn, &attribute, &value).await?;
        return Ok(1);
    }

    let original = service.entry(dn).await?.ok_or_else(|| CliError::NotFound {
        resource_type: "entry".to_string(),
        id: dn.to_string(),
    })?;
    let modified = apply_edits(&original, set, clear)?;
    Ok(service.update_entry(&original, &modified).await?)
}

/// Deletes an entry.
pub async fn run_delete(
    dn: &str,
    force: bool,
    name: &str,
    profile: &DirectoryConfig,
) -> crate::CliResult<()> {
    if !force && !confirm(&format!("Are you sure you want to delete entry '{dn}'?"))? {
        error("Operation cancelled");
        return Ok(());
    }

    let service = super::connect(name, profile)?;
    let result = service.delete_entry(dn).await;
    service.shutdown().await;
    result?;

    success(&format!("Entry '{dn}' deleted"));
    Ok(())
}
