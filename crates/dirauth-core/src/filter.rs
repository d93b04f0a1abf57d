//! Filter and DN escaping, and `{username}` template rendering.

/// Placeholder substituted in bind DN and user filter templates.
pub const USERNAME_PLACEHOLDER: &str = "{username}";

/// Escapes special characters in LDAP filter values (RFC 4515).
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\5c"),
            '*' => result.push_str("\\2a"),
            '(' => result.push_str("\\28"),
            ')' => result.push_str("\\29"),
            '\0' => result.push_str("\\00"),
            _ => result.push(c),
        }
    }
    result
}

/// Escapes a value for use inside a DN attribute value (RFC 4514).
#[must_use]
pub fn escape_dn_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len() * 2);
    let last = value.chars().count().saturating_sub(1);

    for (i, c) in value.chars().enumerate() {
        match c {
            ' ' if i == 0 || i == last => result.push_str("\\20"),
            '#' if i == 0 => result.push_str("\\23"),
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(c);
            }
            '\0' => result.push_str("\\00"),
            _ => result.push(c),
        }
    }
    result
}

/// Renders a bind DN template, DN-escaping the username.
#[must_use]
pub fn render_dn_template(template: &str, username: &str) -> String {
    template.replace(USERNAME_PLACEHOLDER, &escape_dn_value(username))
}

/// Renders a filter template, filter-escaping the username.
#[must_use]
pub fn render_filter_template(template: &str, username: &str) -> String {
    template.replace(USERNAME_PLACEHOLDER, &escape_filter_value(username))
}

/// Returns true if the principal already is a distinguished name.
///
/// A DN has at least one `attr=value` RDN whose attribute name is a
/// plain identifier or OID.
#[must_use]
pub fn looks_like_dn(principal: &str) -> bool {
    let Some((attr, value)) = principal.split_once('=') else {
        return false;
    };
    let attr = attr.trim();
    !attr.is_empty()
        && !value.is_empty()
        && attr
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

/// Performs a shallow structural check of a filter string.
///
/// Catches unbalanced parentheses and empty filters before a request is
/// sent; full parsing happens in the directory client.
#[must_use]
pub fn is_balanced_filter(filter: &str) -> bool {
    let trimmed = filter.trim();
    if trimmed.is_empty() {
        return false;
    }

    let mut depth: i32 = 0;
    let mut escaped = false;
    for c in trimmed.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_escape_special_chars() {
        assert_eq!(escape_filter_value("john*"), "john\\2a");
        assert_eq!(escape_filter_value("(admin)"), "\\28admin\\29");
        assert_eq!(escape_filter_value("user\\name"), "user\\5cname");
        assert_eq!(escape_filter_value("normal"), "normal");
    }

    #[test]
    fn dn_escape_special_chars() {
        assert_eq!(escape_dn_value("Doe, John"), "Doe\\, John");
        assert_eq!(escape_dn_value(" padded "), "\\20padded\\20");
        assert_eq!(escape_dn_value("#tag"), "\\23tag");
        assert_eq!(escape_dn_value("a=b+c"), "a\\=b\\+c");
    }

    #[test]
    fn templates_escape_their_input() {
        assert_eq!(
            render_dn_template("uid={username},ou=people,dc=example,dc=com", "j,doe"),
            "uid=j\\,doe,ou=people,dc=example,dc=com"
        );
        assert_eq!(
            render_filter_template("(&(objectClass=person)(uid={username}))", "*)(uid=*"),
            "(&(objectClass=person)(uid=\\2a\\29\\28uid=\\2a))"
        );
    }

    #[test]
    fn dn_detection() {
        assert!(looks_like_dn("uid=jdoe,ou=people,dc=example,dc=com"));
        assert!(looks_like_dn("cn=admin"));
        assert!(!looks_like_dn("jdoe"));
        assert!(!looks_like_dn("jdoe@example.com"));
        assert!(!looks_like_dn("=value"));
        assert!(!looks_like_dn("we ird=value"));
    }

    #[test]
    fn filter_balance() {
        assert!(is_balanced_filter("(objectClass=*)"));
        assert!(is_balanced_filter("(&(uid=a)(|(cn=b)(cn=c)))"));
        assert!(is_balanced_filter("(cn=\\28escaped)"));
        assert!(!is_balanced_filter("(cn=a"));
        assert!(!is_balanced_filter("cn=a)"));
        assert!(!is_balanced_filter("   "));
    }
}
