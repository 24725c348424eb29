//! Server capabilities learned from the root metadata entry.

/// Simple paged results control.
pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";
/// Server-side sort request control.
pub const SERVER_SIDE_SORT_OID: &str = "1.2.840.113556.1.4.473";
/// Virtual list view request control.
pub const VIRTUAL_LIST_VIEW_OID: &str = "2.16.840.1.113730.3.4.9";
/// Tree delete control.
pub const SUBTREE_DELETE_OID: &str = "1.2.840.113556.1.4.805";

const DEFAULT_PROTOCOL_VERSION: u32 = 2;
const DEFAULT_SUBSCHEMA: &str = "cn=schema";

/// What the server said about itself.
///
/// The default is deliberately conservative: protocol version 2, schema at
/// `cn=schema`, no optional controls known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCapabilities {
    /// Highest supported protocol version.
    pub protocol_version: u32,
    /// DN of the subschema subentry.
    pub subschema_subentry: String,
    /// Advertised controls, or `None` when the server was never probed.
    pub supported_controls: Option<Vec<String>>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            subschema_subentry: DEFAULT_SUBSCHEMA.to_string(),
            supported_controls: None,
        }
    }
}

impl ServerCapabilities {
    /// Build from raw root metadata attribute values.
    ///
    /// Unparsable versions are ignored; missing values fall back to the
    /// conservative defaults.
    pub fn from_root_metadata(
        versions: &[String],
        subschema_subentry: Option<&str>,
        controls: Vec<String>,
    ) -> Self {
        let protocol_version = versions
            .iter()
            .filter_map(|v| v.trim().parse::<u32>().ok())
            .max()
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);
        let subschema_subentry = subschema_subentry
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SUBSCHEMA)
            .to_string();
        Self {
            protocol_version,
            subschema_subentry,
            supported_controls: Some(controls),
        }
    }

    fn advertises(&self, oid: &str) -> Option<bool> {
        self.supported_controls
            .as_ref()
            .map(|controls| controls.iter().any(|c| c == oid))
    }

    /// Whether the server deletes whole subtrees in one operation.
    pub fn supports_subtree_delete(&self) -> bool {
        self.advertises(SUBTREE_DELETE_OID).unwrap_or(false)
    }

    /// Whether cookie paging is available. Assumed when never probed.
    pub fn supports_paged_results(&self) -> bool {
        self.advertises(PAGED_RESULTS_OID).unwrap_or(true)
    }

    /// Whether offset windows are available.
    pub fn supports_virtual_list_view(&self) -> bool {
        self.advertises(VIRTUAL_LIST_VIEW_OID).unwrap_or(false)
            && self.advertises(SERVER_SIDE_SORT_OID).unwrap_or(false)
    }

    /// Whether the server sorts results.
    pub fn supports_server_side_sort(&self) -> bool {
        self.advertises(SERVER_SIDE_SORT_OID).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let caps = ServerCapabilities::default();
        assert_eq!(caps.protocol_version, 2);
        assert_eq!(caps.subschema_subentry, "cn=schema");
        assert!(!caps.supports_subtree_delete());
        assert!(!caps.supports_virtual_list_view());
        assert!(caps.supports_paged_results());
    }

    #[test]
    fn parses_root_metadata() {
        let caps = ServerCapabilities::from_root_metadata(
            &["2".into(), "3".into(), "x".into()],
            Some("cn=Subschema"),
            vec![SUBTREE_DELETE_OID.into(), VIRTUAL_LIST_VIEW_OID.into()],
        );
        assert_eq!(caps.protocol_version, 3);
        assert_eq!(caps.subschema_subentry, "cn=Subschema");
        assert!(caps.supports_subtree_delete());
        assert!(!caps.supports_paged_results());
        // VLV needs server side sort as well
        assert!(!caps.supports_virtual_list_view());
    }
}
