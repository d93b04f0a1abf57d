//! Entry comparison for updates.

use std::collections::BTreeSet;

use crate::model::{DirectoryEntry, Modification};

/// Computes the modifications that turn `original` into `modified`.
///
/// Attributes only in `modified` are added, attributes whose value set
/// changed are replaced, and attributes missing from `modified` are
/// deleted. Attribute names compare case-insensitively; value order is
/// ignored. Returns an empty list when the entries match.
#[must_use]
pub fn compute_modifications(original: &DirectoryEntry, modified: &DirectoryEntry) -> Vec<Modification> {
    let mut modifications = Vec::new();

    for (name, values) in &modified.attributes {
        match original.values(name) {
            None if values.is_empty() => {}
            None => modifications.push(Modification::Add {
                attribute: name.clone(),
                values: values.clone(),
            }),
            Some(existing) if value_set(existing) != value_set(values) => {
                modifications.push(Modification::Replace {
                    attribute: name.clone(),
                    values: values.clone(),
                });
            }
            Some(_) => {}
        }
    }

    for name in original.attributes.keys() {
        if modified.values(name).is_none() {
            modifications.push(Modification::Delete {
                attribute: name.clone(),
                values: Vec::new(),
            });
        }
    }

    modifications
}

fn value_set(values: &[String]) -> BTreeSet<&str> {
    values.iter().map(String::as_str).collect()
}
