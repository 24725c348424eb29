//! [`DirectoryConnection`] over a synchronous `ldap3` connection.

use std::fmt;

use dirstore_core::ldap::{DirectoryConnection, RawSearch, RawSearchResult, SearchControl};
use dirstore_core::OperationResult;
use dirstore_model::{Entry, Modification, ResultCode, SearchScope};
use ldap3::controls::RawControl;
use ldap3::{LdapConn, Scope, SearchEntry, SearchOptions};
use tracing::{debug, trace};

use crate::controls;
use crate::convert;

fn scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

/// One bound connection.
///
/// A transport failure marks the connection broken; the pool stops
/// handing it out.
pub struct Ldap3Connection {
    conn: LdapConn,
    target: String,
    broken: bool,
}

impl fmt::Debug for Ldap3Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ldap3Connection")
            .field("target", &self.target)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

impl Ldap3Connection {
    pub(crate) fn new(conn: LdapConn, target: String) -> Self {
        Self {
            conn,
            target,
            broken: false,
        }
    }

    /// Host this connection was opened to.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns true once a transport failure was seen.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub(crate) fn unbind(mut self) {
        if let Err(err) = self.conn.unbind() {
            debug!(host = %self.target, error = %err, "unbind failed");
        }
    }

    fn observe<T>(&mut self, result: Result<T, ldap3::LdapError>) -> OperationResult<T> {
        result.map_err(|err| {
            let err = convert::operation_error(err);
            if err.is_connection_loss() {
                self.broken = true;
            }
            err
        })
    }

    fn finish(&mut self, result: Result<ldap3::LdapResult, ldap3::LdapError>) -> OperationResult<()> {
        let result = self.observe(result)?;
        convert::check(result).inspect_err(|err| {
            if err.is_connection_loss() {
                self.broken = true;
            }
        })
    }

    /// Search the root DSE.
    pub(crate) fn root_metadata(&mut self, attributes: &[&str]) -> OperationResult<Option<Entry>> {
        let attributes: Vec<String> = attributes.iter().map(|a| a.to_string()).collect();
        let search = RawSearch {
            base_dn: "",
            scope: SearchScope::Base,
            filter: "(objectClass=*)",
            attributes: &attributes,
            size_limit: 1,
        };
        let result = self.raw_search(&search, &[])?;
        Ok(result.entries.into_iter().next())
    }
}

impl DirectoryConnection for Ldap3Connection {
    fn bind(&mut self, dn: &str, secret: &str) -> OperationResult<()> {
        let result = self.conn.simple_bind(dn, secret);
        self.finish(result)
    }

    fn raw_search(
        &mut self,
        search: &RawSearch<'_>,
        search_controls: &[SearchControl],
    ) -> OperationResult<RawSearchResult> {
        let raw: Vec<RawControl> = search_controls.iter().map(controls::to_raw).collect();
        let options = SearchOptions::new().sizelimit(i32::try_from(search.size_limit).unwrap_or(i32::MAX));
        let attributes: Vec<&str> = search.attributes.iter().map(String::as_str).collect();
        trace!(base = search.base_dn, filter = search.filter, controls = raw.len(), "search");

        let found = self
            .conn
            .with_search_options(options)
            .with_controls(raw)
            .search(search.base_dn, scope(search.scope), search.filter, attributes);
        let ldap3::SearchResult(entries, result) = self.observe(found)?;

        let code = ResultCode::from_code(result.rc);
        if !code.is_success() && code != ResultCode::SizeLimitExceeded {
            let err = convert::result_error(&result);
            if err.is_connection_loss() {
                self.broken = true;
            }
            return Err(err);
        }
        Ok(RawSearchResult {
            entries: entries
                .into_iter()
                .map(|e| convert::entry_from_search(SearchEntry::construct(e)))
                .collect(),
            cookie: controls::paged_results_cookie(&result.ctrls),
            vlv: controls::virtual_list_view_response(&result.ctrls),
        })
    }

    fn raw_add(&mut self, entry: &Entry) -> OperationResult<()> {
        let result = self.conn.add(&entry.dn, convert::add_attributes(entry));
        self.finish(result)
    }

    fn raw_modify(&mut self, dn: &str, changes: &[Modification]) -> OperationResult<()> {
        let result = self.conn.modify(dn, convert::modifications(changes));
        self.finish(result)
    }

    fn raw_delete(&mut self, dn: &str, subtree: bool) -> OperationResult<()> {
        let result = if subtree {
            self.conn.with_controls(controls::subtree_delete()).delete(dn)
        } else {
            self.conn.delete(dn)
        };
        self.finish(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_map_one_to_one() {
        assert!(matches!(scope(SearchScope::Base), Scope::Base));
        assert!(matches!(scope(SearchScope::OneLevel), Scope::OneLevel));
        assert!(matches!(scope(SearchScope::Subtree), Scope::Subtree));
    }
}
