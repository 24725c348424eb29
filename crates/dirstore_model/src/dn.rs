//! Distinguished name helpers (RFC 4514).
//!
//! These helpers work on the string form of a DN. Comparisons go through
//! [`normalize`], which lowercases attribute types and values and trims
//! insignificant whitespace around separators.

use crate::{ModelError, ModelResult};

/// Escape a value for use inside an RDN.
///
/// Escapes `, + " \ < > ; =` with a backslash, NUL as `\00`, a leading or
/// trailing space as `\20` and a leading `#` as `\23`.
pub fn escape_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut result = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if i == 0 || i == last => result.push_str("\\20"),
            '#' if i == 0 => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}

/// Reverse [`escape_value`], including `\XX` hex escapes.
pub fn unescape_value(value: &str) -> ModelResult<String> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let first = chars
            .next()
            .ok_or_else(|| ModelError::invalid_dn(value, "dangling escape"))?;
        if first.is_ascii_hexdigit() {
            let second = chars
                .next()
                .filter(char::is_ascii_hexdigit)
                .ok_or_else(|| ModelError::invalid_dn(value, "truncated hex escape"))?;
            let pair: String = [first, second].iter().collect();
            let byte = u8::from_str_radix(&pair, 16)
                .map_err(|_| ModelError::invalid_dn(value, "bad hex escape"))?;
            bytes.push(byte);
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(first.encode_utf8(&mut buf).as_bytes());
        }
    }

    String::from_utf8(bytes).map_err(|_| ModelError::invalid_dn(value, "escape is not UTF-8"))
}

/// Split a DN into its RDN components, leaf first.
pub fn rdns(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, ch) in dn.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            ',' | ';' => {
                parts.push(dn[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = dn[start..].trim();
    if !tail.is_empty() || !parts.is_empty() {
        parts.push(tail);
    }
    parts
}

/// Split an RDN into its attribute type and unescaped value.
pub fn rdn_parts(rdn: &str) -> ModelResult<(String, String)> {
    let (attr, value) = rdn
        .split_once('=')
        .ok_or_else(|| ModelError::invalid_dn(rdn, "RDN has no '='"))?;
    let attr = attr.trim();
    if attr.is_empty() {
        return Err(ModelError::invalid_dn(rdn, "RDN has no attribute type"));
    }
    Ok((attr.to_string(), unescape_value(value.trim())?))
}

/// Parent DN, or `None` for a single-RDN name.
pub fn parent(dn: &str) -> Option<String> {
    let parts = rdns(dn);
    if parts.len() < 2 {
        return None;
    }
    Some(parts[1..].join(","))
}

/// Build a child DN from an attribute, an unescaped value and a parent.
pub fn child(attribute: &str, value: &str, parent: &str) -> String {
    if parent.is_empty() {
        format!("{}={}", attribute, escape_value(value))
    } else {
        format!("{}={},{}", attribute, escape_value(value), parent)
    }
}

/// Canonical comparison form of a DN.
pub fn normalize(dn: &str) -> String {
    rdns(dn)
        .into_iter()
        .map(|rdn| match rdn.split_once('=') {
            Some((attr, value)) => format!(
                "{}={}",
                attr.trim().to_ascii_lowercase(),
                value.trim().to_lowercase()
            ),
            None => rdn.to_lowercase(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Number of RDNs `dn` sits below `base`, or `None` if it is not inside it.
pub fn depth_below(dn: &str, base: &str) -> Option<usize> {
    let dn = normalize(dn);
    let base = normalize(base);
    if base.is_empty() {
        return Some(rdns(&dn).len());
    }
    if dn == base {
        return Some(0);
    }
    let prefix = dn.strip_suffix(&base)?.strip_suffix(',')?;
    Some(rdns(prefix).len())
}

/// Returns true if `dn` equals `base` or sits anywhere below it.
pub fn is_within(dn: &str, base: &str) -> bool {
    depth_below(dn, base).is_some()
}

/// Heuristic used by authentication: identifiers with an `=` are DNs.
pub fn looks_like_dn(identifier: &str) -> bool {
    rdns(identifier)
        .first()
        .is_some_and(|rdn| rdn_parts(rdn).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_special_characters() {
        assert_eq!(escape_value("Smith, John"), "Smith\\, John");
        assert_eq!(escape_value("a+b=c"), "a\\+b\\=c");
        assert_eq!(escape_value(" lead"), "\\20lead");
        assert_eq!(escape_value("trail "), "trail\\20");
        assert_eq!(escape_value("#hash"), "\\23hash");
        assert_eq!(escape_value("mid#dle"), "mid#dle");
        assert_eq!(escape_value(""), "");
    }

    #[test]
    fn unescape_round_trip() {
        for raw in ["Smith, John", " padded ", "#tag", "a\\b", "ü+ö"] {
            assert_eq!(unescape_value(&escape_value(raw)).unwrap(), raw);
        }
        assert_eq!(unescape_value("caf\\c3\\a9").unwrap(), "café");
        assert!(unescape_value("oops\\").is_err());
    }

    #[test]
    fn split_respects_escapes() {
        let parts = rdns("cn=Smith\\, John, ou=people,o=example");
        assert_eq!(parts, vec!["cn=Smith\\, John", "ou=people", "o=example"]);
        assert!(rdns("").is_empty());
    }

    #[test]
    fn parent_and_child() {
        assert_eq!(
            parent("uid=a,ou=people,o=example").as_deref(),
            Some("ou=people,o=example")
        );
        assert_eq!(parent("o=example"), None);
        assert_eq!(child("cn", "x,y", "o=example"), "cn=x\\,y,o=example");
    }

    #[test]
    fn rdn_parts_unescape() {
        let (attr, value) = rdn_parts("cn=Smith\\, John").unwrap();
        assert_eq!(attr, "cn");
        assert_eq!(value, "Smith, John");
        assert!(rdn_parts("novalue").is_err());
    }

    #[test]
    fn scope_depth() {
        let base = "ou=People, o=Example";
        assert_eq!(depth_below("ou=people,o=example", base), Some(0));
        assert_eq!(depth_below("uid=a,ou=people,o=example", base), Some(1));
        assert_eq!(depth_below("cn=x,uid=a,ou=people,o=example", base), Some(2));
        assert_eq!(depth_below("uid=a,ou=groups,o=example", base), None);
        assert_eq!(depth_below("uid=a,xou=people,o=example", base), None);
    }

    #[test]
    fn dn_detection() {
        assert!(looks_like_dn("uid=alice,o=example"));
        assert!(!looks_like_dn("alice"));
    }

    proptest::proptest! {
        #[test]
        fn escape_then_split_keeps_one_rdn(value in "\\PC{0,24}") {
            let dn = child("cn", &value, "o=example");
            let parts = rdns(&dn);
            proptest::prop_assert_eq!(parts.len(), 2);
            let (_, unescaped) = rdn_parts(parts[0]).unwrap();
            proptest::prop_assert_eq!(unescaped.trim(), value.trim());
        }
    }
}
