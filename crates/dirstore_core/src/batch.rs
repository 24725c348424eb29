//! Resumable batch scans.
//!
//! A scan delivers pages to two caller callbacks: `collect` sees each page
//! first and decides whether its entries are kept in the outcome, then
//! `process` is notified. When a scan stops before the result set is
//! exhausted it returns a [`BatchCursor`]. Passing the cursor to the next
//! scan call continues where the previous one stopped; dropping it ends the
//! scan and gives back whatever the backend held for it.

use std::any::Any;
use std::fmt;

use dirstore_model::Entry;

/// Opaque position inside a scan.
///
/// For directory backends the cursor owns the connection the scan runs on,
/// because resume cookies are only valid on the connection that issued them.
pub struct BatchCursor {
    token: Vec<u8>,
    lease: Option<Box<dyn Any + Send>>,
    delivered: usize,
}

impl BatchCursor {
    pub(crate) fn new(token: Vec<u8>, lease: Option<Box<dyn Any + Send>>, delivered: usize) -> Self {
        Self {
            token,
            lease,
            delivered,
        }
    }

    pub(crate) fn token(&self) -> &[u8] {
        &self.token
    }

    pub(crate) fn take_lease(&mut self) -> Option<Box<dyn Any + Send>> {
        self.lease.take()
    }

    /// Entries delivered so far over the whole scan.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// End the scan and give back held resources.
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for BatchCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCursor")
            .field("token_len", &self.token.len())
            .field("holds_connection", &self.lease.is_some())
            .field("delivered", &self.delivered)
            .finish()
    }
}

/// Result of one scan call.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Entries of the pages `collect` accepted.
    pub collected: Vec<Entry>,
    /// Pages delivered during this call.
    pub pages: usize,
    /// Where to continue, if more results are available.
    pub cursor: Option<BatchCursor>,
}

impl ScanOutcome {
    /// Returns true if the scan stopped before the end of the result set.
    pub fn more_results_available(&self) -> bool {
        self.cursor.is_some()
    }
}

/// Hand a page to the callbacks, keeping it when `collect` accepts it.
pub(crate) fn deliver(
    page: Vec<Entry>,
    outcome: &mut ScanOutcome,
    collect: &mut dyn FnMut(&[Entry]) -> bool,
    process: &mut dyn FnMut(&[Entry]),
) {
    outcome.pages += 1;
    let keep = collect(&page);
    process(&page);
    if keep {
        outcome.collected.extend(page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_vetoes_accumulation() {
        let mut outcome = ScanOutcome::default();
        let mut seen = 0;
        let mut keep = true;
        for n in 0..3 {
            let page = vec![Entry::new(format!("cn={n}"))];
            deliver(
                page,
                &mut outcome,
                &mut |_| {
                    keep = !keep;
                    keep
                },
                &mut |p| seen += p.len(),
            );
        }
        assert_eq!(outcome.pages, 3);
        assert_eq!(seen, 3);
        assert_eq!(outcome.collected.len(), 1);
        assert_eq!(outcome.collected[0].dn, "cn=1");
        assert!(!outcome.more_results_available());
    }

    #[test]
    fn cursor_debug_hides_token() {
        let cursor = BatchCursor::new(vec![1, 2, 3], None, 7);
        assert_eq!(cursor.delivered(), 7);
        assert!(format!("{cursor:?}").contains("token_len: 3"));
        cursor.release();
    }
}
