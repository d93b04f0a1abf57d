//! Conversion of `ldap3` search entries.

use dirauth_core::DirectoryEntry;
use ldap3::SearchEntry;

/// Binary attributes that hold a GUID and are also exposed as text.
const GUID_ATTRIBUTES: &[&str] = &["objectGUID"];

/// Converts a search entry into a [`DirectoryEntry`].
///
/// Active Directory `objectGUID` values are additionally exposed as a
/// formatted text attribute.
#[must_use]
pub fn from_search_entry(entry: SearchEntry) -> DirectoryEntry {
    let mut attributes: dirauth_core::Attributes = entry.attrs.into_iter().collect();
    let binary_attributes = entry.bin_attrs.into_iter().collect::<std::collections::BTreeMap<_, _>>();

    for (name, values) in &binary_attributes {
        if GUID_ATTRIBUTES.iter().any(|g| g.eq_ignore_ascii_case(name)) {
            attributes.insert(name.clone(), values.iter().map(|v| format_guid(v)).collect());
        }
    }

    DirectoryEntry {
        dn: entry.dn,
        attributes,
        binary_attributes,
    }
}

/// Formats a binary GUID (Active Directory format) as a string.
#[must_use]
pub fn format_guid(bytes: &[u8]) -> String {
    if bytes.len() != 16 {
        return hex::encode(bytes);
    }

    // Active Directory GUID format (mixed endianness)
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{}-{}",
        bytes[3],
        bytes[2],
        bytes[1],
        bytes[0],
        bytes[5],
        bytes[4],
        bytes[7],
        bytes[6],
        hex::encode(&bytes[8..10]),
        hex::encode(&bytes[10..16])
    )
}
