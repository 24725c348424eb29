//! Password hashing applied right before writes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};

const SSHA256_PREFIX: &str = "{SSHA256}";
const SALT_LEN: usize = 8;
const KNOWN_SCHEMES: [&str; 12] = [
    "SSHA256", "SSHA384", "SSHA512", "SSHA", "SHA256", "SHA384", "SHA512", "SHA", "SMD5", "MD5", "CRYPT", "PBKDF2",
];
const DIGEST_LEN: usize = 32;

/// Encoding applied to password attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PasswordEncoding {
    /// Store as given; the server hashes it.
    #[default]
    Plain,
    /// Salted SHA-256: `{SSHA256}` + base64(digest ‖ salt).
    Ssha256,
}

impl PasswordEncoding {
    /// Parse a configured method name. Unknown names mean plain text.
    pub fn from_name(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "SSHA256" => Self::Ssha256,
            _ => Self::Plain,
        }
    }

    /// Encode a secret. Values that already carry a known `{SCHEME}` prefix
    /// are returned unchanged.
    pub fn encode(self, secret: &str) -> String {
        if is_hashed(secret) {
            return secret.to_string();
        }
        match self {
            Self::Plain => secret.to_string(),
            Self::Ssha256 => {
                let mut salt = [0u8; SALT_LEN];
                rand::thread_rng().fill_bytes(&mut salt);
                ssha256(secret, &salt)
            }
        }
    }

    /// Check a secret against a stored value.
    pub fn verify(stored: &str, secret: &str) -> bool {
        let Some(encoded) = stored.strip_prefix(SSHA256_PREFIX) else {
            return stored == secret;
        };
        let Ok(raw) = STANDARD.decode(encoded) else {
            return false;
        };
        if raw.len() <= DIGEST_LEN {
            return false;
        }
        let (digest, salt) = raw.split_at(DIGEST_LEN);
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.update(salt);
        hasher.finalize().as_slice() == digest
    }
}

fn is_hashed(value: &str) -> bool {
    let Some((scheme, _)) = value.strip_prefix('{').and_then(|rest| rest.split_once('}')) else {
        return false;
    };
    // PBKDF2 variants look like {PBKDF2-SHA256}
    let family = scheme.split('-').next().unwrap_or(scheme);
    KNOWN_SCHEMES.iter().any(|known| known.eq_ignore_ascii_case(family))
}

fn ssha256(secret: &str, salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(salt);
    let mut raw = hasher.finalize().to_vec();
    raw.extend_from_slice(salt);
    format!("{SSHA256_PREFIX}{}", STANDARD.encode(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssha256_round_trip() {
        let stored = PasswordEncoding::Ssha256.encode("s3cret");
        assert!(stored.starts_with("{SSHA256}"));
        assert!(PasswordEncoding::verify(&stored, "s3cret"));
        assert!(!PasswordEncoding::verify(&stored, "other"));
    }

    #[test]
    fn salts_differ() {
        let a = PasswordEncoding::Ssha256.encode("same");
        let b = PasswordEncoding::Ssha256.encode("same");
        assert_ne!(a, b);
    }

    #[test]
    fn already_encoded_is_kept() {
        let stored = PasswordEncoding::Ssha256.encode("x");
        assert_eq!(PasswordEncoding::Ssha256.encode(&stored), stored);
    }

    #[test]
    fn braces_alone_are_not_a_scheme() {
        for secret in ["{hunter2", "{}open", "{notascheme}pw"] {
            let stored = PasswordEncoding::Ssha256.encode(secret);
            assert!(stored.starts_with("{SSHA256}"), "{secret} -> {stored}");
            assert!(PasswordEncoding::verify(&stored, secret));
        }
        assert_eq!(PasswordEncoding::Ssha256.encode("{SSHA}abc"), "{SSHA}abc");
        assert_eq!(PasswordEncoding::Ssha256.encode("{pbkdf2-sha256}x"), "{pbkdf2-sha256}x");
    }

    #[test]
    fn plain() {
        assert_eq!(PasswordEncoding::Plain.encode("p"), "p");
        assert!(PasswordEncoding::verify("p", "p"));
        assert!(!PasswordEncoding::verify("{SSHA256}!!!", "p"));
    }

    #[test]
    fn names() {
        assert_eq!(PasswordEncoding::from_name("SSHA-256"), PasswordEncoding::Ssha256);
        assert_eq!(PasswordEncoding::from_name("ssha256"), PasswordEncoding::Ssha256);
        assert_eq!(PasswordEncoding::from_name("md5"), PasswordEncoding::Plain);
    }
}
