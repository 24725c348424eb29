//! Document keys derived from DNs.
//!
//! The last RDN names the naming context and is dropped; the remaining RDN
//! values are joined parent first with `_`. `ou=people,o=example` becomes
//! `people` and `uid=alice,ou=people,o=example` becomes `people_alice`.
//! Keys compare case-insensitively through DN normalization.

use dirstore_model::{dn, ModelResult, SearchScope};

const SEPARATOR: char = '_';

fn encode_segment(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '_' => out.push_str("%5F"),
            other => out.push(other),
        }
    }
}

/// Key of the document stored for `entry_dn`.
///
/// # Errors
///
/// Returns an error for a malformed RDN.
pub fn document_key(entry_dn: &str) -> ModelResult<String> {
    let normalized = dn::normalize(entry_dn);
    let rdns = dn::rdns(&normalized);
    let Some((_, below_context)) = rdns.split_last() else {
        return Ok(String::new());
    };

    let mut key = String::new();
    for rdn in below_context.iter().rev() {
        let (_, value) = dn::rdn_parts(rdn)?;
        if !key.is_empty() {
            key.push(SEPARATOR);
        }
        encode_segment(&value, &mut key);
    }
    Ok(key)
}

/// Returns true if `key` lies in `scope` below the document keyed `base`.
pub fn key_in_scope(key: &str, base: &str, scope: SearchScope) -> bool {
    let rest = if base.is_empty() {
        Some(key)
    } else if key == base {
        Some("")
    } else {
        key.strip_prefix(base).and_then(|r| r.strip_prefix(SEPARATOR))
    };
    let Some(rest) = rest else {
        return false;
    };
    match scope {
        SearchScope::Base => rest.is_empty(),
        SearchScope::OneLevel => !rest.is_empty() && !rest.contains(SEPARATOR),
        SearchScope::Subtree => true,
    }
}
