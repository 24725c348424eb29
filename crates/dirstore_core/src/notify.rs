//! Delete notifications.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

/// Observer of entry removals.
pub trait DeleteNotifier: Send + Sync {
    /// Called before `dn` (and, for subtree deletes, its children) is removed.
    fn on_before_remove(&self, dn: &str, subtree: bool) {
        let _ = (dn, subtree);
    }

    /// Called after the removal attempt.
    fn on_after_remove(&self, dn: &str, subtree: bool, removed: bool) {
        let _ = (dn, subtree, removed);
    }
}

/// Registered notifiers, called in registration order.
#[derive(Default)]
pub struct DeleteNotifiers {
    notifiers: RwLock<Vec<Arc<dyn DeleteNotifier>>>,
}

impl DeleteNotifiers {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a notifier.
    pub fn register(&self, notifier: Arc<dyn DeleteNotifier>) {
        self.notifiers.write().push(notifier);
    }

    /// Number of registered notifiers.
    pub fn len(&self) -> usize {
        self.notifiers.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.notifiers.read().is_empty()
    }

    /// Run `delete` between the before and after callbacks.
    pub fn around<T, E>(
        &self,
        dn: &str,
        subtree: bool,
        delete: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let notifiers: Vec<Arc<dyn DeleteNotifier>> = self.notifiers.read().clone();
        trace!(dn, subtree, notifiers = notifiers.len(), "notifying delete");
        for n in &notifiers {
            n.on_before_remove(dn, subtree);
        }
        let result = delete();
        for n in &notifiers {
            n.on_after_remove(dn, subtree, result.is_ok());
        }
        result
    }
}

impl std::fmt::Debug for DeleteNotifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteNotifiers")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl DeleteNotifier for Recorder {
        fn on_before_remove(&self, dn: &str, subtree: bool) {
            self.events.lock().push(format!("before {dn} {subtree}"));
        }

        fn on_after_remove(&self, dn: &str, _subtree: bool, removed: bool) {
            self.events.lock().push(format!("after {dn} {removed}"));
        }
    }

    #[test]
    fn callbacks_wrap_the_delete() {
        let recorder = Arc::new(Recorder::default());
        let notifiers = DeleteNotifiers::new();
        notifiers.register(recorder.clone());

        let ok: Result<(), ()> = notifiers.around("cn=a", false, || Ok(()));
        assert!(ok.is_ok());
        let failed: Result<(), &str> = notifiers.around("cn=b", true, || Err("no"));
        assert!(failed.is_err());

        assert_eq!(
            *recorder.events.lock(),
            vec!["before cn=a false", "after cn=a true", "before cn=b true", "after cn=b false"]
        );
    }
}
