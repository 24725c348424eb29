//! Engine configuration.

use std::collections::HashMap;

use crate::password::PasswordEncoding;

/// Default attributes treated as passwords.
pub const DEFAULT_PASSWORD_ATTRIBUTES: &[&str] = &["userPassword"];

/// Options shared by the persistence engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How password attributes are encoded before writes.
    pub password_encoding: PasswordEncoding,

    /// Attributes whose values are hashed before writes.
    pub password_attributes: Vec<String>,

    /// Attributes whose values are carried as raw bytes.
    pub binary_attributes: Vec<String>,

    /// Binary attributes transferred with the `;binary` option.
    pub certificate_attributes: Vec<String>,

    /// Delete expired cache entries when a read observes them.
    pub delete_expired_on_get: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            password_encoding: PasswordEncoding::Plain,
            password_attributes: DEFAULT_PASSWORD_ATTRIBUTES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            binary_attributes: Vec::new(),
            certificate_attributes: Vec::new(),
            delete_expired_on_get: false,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the password encoding.
    #[must_use]
    pub fn password_encoding(mut self, encoding: PasswordEncoding) -> Self {
        self.password_encoding = encoding;
        self
    }

    /// Sets the binary attributes.
    #[must_use]
    pub fn binary_attributes<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.binary_attributes = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the certificate attributes. They are binary as well.
    #[must_use]
    pub fn certificate_attributes<S: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.certificate_attributes = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether reads delete expired cache entries.
    #[must_use]
    pub const fn delete_expired_on_get(mut self, value: bool) -> Self {
        self.delete_expired_on_get = value;
        self
    }

    /// Read `binaryAttributes`, `certificateAttributes` and
    /// `password.encryption.method` from a properties map.
    ///
    /// Unknown encoding names fall back to plain text.
    pub fn from_properties(properties: &HashMap<String, String>) -> Self {
        let list = |key: &str| -> Vec<String> {
            properties
                .get(key)
                .map(|v| {
                    v.split(|c: char| c == ',' || c.is_whitespace())
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut config = Self::default()
            .binary_attributes(list("binaryAttributes"))
            .certificate_attributes(list("certificateAttributes"));
        if let Some(method) = properties.get("password.encryption.method") {
            config.password_encoding = PasswordEncoding::from_name(method);
        }
        config
    }

    /// Returns true if the attribute carries bytes.
    pub fn is_binary(&self, attribute: &str) -> bool {
        let base = strip_binary_option(attribute);
        self.binary_attributes
            .iter()
            .chain(&self.certificate_attributes)
            .any(|a| a.eq_ignore_ascii_case(base))
    }

    /// Returns true if the attribute uses the `;binary` transfer option.
    pub fn is_certificate(&self, attribute: &str) -> bool {
        let base = strip_binary_option(attribute);
        self.certificate_attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(base))
    }

    /// Returns true if the attribute holds a password.
    pub fn is_password(&self, attribute: &str) -> bool {
        self.password_attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(attribute))
    }
}

/// Attribute name without a trailing `;binary` option.
pub fn strip_binary_option(attribute: &str) -> &str {
    match attribute.len().checked_sub(";binary".len()) {
        Some(split)
            if attribute.is_char_boundary(split)
                && attribute[split..].eq_ignore_ascii_case(";binary") =>
        {
            &attribute[..split]
        }
        _ => attribute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.password_encoding, PasswordEncoding::Plain);
        assert!(config.is_password("USERPASSWORD"));
        assert!(!config.delete_expired_on_get);
    }

    #[test]
    fn certificate_attributes_are_binary() {
        let config = EngineConfig::new()
            .binary_attributes(["jpegPhoto"])
            .certificate_attributes(["userCertificate"]);
        assert!(config.is_binary("jpegphoto"));
        assert!(config.is_binary("userCertificate;binary"));
        assert!(config.is_certificate("userCertificate"));
        assert!(!config.is_certificate("jpegPhoto"));
        assert!(!config.is_binary("cn"));
    }

    #[test]
    fn from_properties() {
        let props: HashMap<String, String> = [
            ("binaryAttributes", "jpegPhoto, objectGUID"),
            ("certificateAttributes", "userCertificate"),
            ("password.encryption.method", "SSHA-256"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = EngineConfig::from_properties(&props);
        assert_eq!(config.binary_attributes, vec!["jpegPhoto", "objectGUID"]);
        assert!(config.is_certificate("usercertificate"));
        assert_eq!(config.password_encoding, PasswordEncoding::Ssha256);
    }

    #[test]
    fn strip_option() {
        assert_eq!(strip_binary_option("userCertificate;binary"), "userCertificate");
        assert_eq!(strip_binary_option("cn"), "cn");
    }
}
