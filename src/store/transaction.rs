//! One lock-protected read, modify, validate, publish cycle.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::MutexGuard;

use crate::dynamic::schema::ConfigSnapshot;
use crate::keys::{KeyError, KeyMaterialManager};
use crate::store::{ConfigStore, StoreError};

/// A running transaction. Holds the store's mutation lock until dropped.
///
/// Key files written through the transaction are recorded; unless
/// [`publish`](Self::publish) succeeds they are removed again before the
/// lock is released, on every exit path.
pub struct Transaction<'a> {
    store: &'a ConfigStore,
    base: Arc<ConfigSnapshot>,
    created: Vec<PathBuf>,
    released: bool,
    // Dropped last, after any rollback.
    _guard: MutexGuard<'a, ()>,
}

impl<'a> Transaction<'a> {
    pub(super) fn new(store: &'a ConfigStore, guard: MutexGuard<'a, ()>, base: Arc<ConfigSnapshot>) -> Self {
        Self {
            store,
            base,
            created: Vec::new(),
            released: false,
            _guard: guard,
        }
    }

    /// The snapshot this transaction edits.
    pub fn base(&self) -> &Arc<ConfigSnapshot> {
        &self.base
    }

    pub fn keys(&self) -> &KeyMaterialManager {
        self.store.keys()
    }

    pub fn postmaster_account(&self) -> &str {
        self.store.postmaster_account()
    }

    /// Writes a new key file, to be removed if the transaction does not
    /// publish.
    pub fn write_key_file(&mut self, rel: &str, data: &[u8]) -> Result<PathBuf, KeyError> {
        let path = self.store.keys().write_key_file(rel, data)?;
        self.created.push(path.clone());
        Ok(path)
    }

    /// Publishes `next` and ends the transaction.
    pub fn publish(self, next: ConfigSnapshot) -> Result<Arc<ConfigSnapshot>, StoreError> {
        self.commit(next, Arc::clone)
    }

    /// Publishes `next`, then runs `after` on the published snapshot while
    /// the lock is still held. `after` does not run if publishing fails.
    ///
    /// Cleanup that depends on the published state, such as retiring key
    /// files no selector references, goes in `after`: no other writer can
    /// reference those files again before it finishes.
    pub fn commit<T>(
        mut self,
        next: ConfigSnapshot,
        after: impl FnOnce(&Arc<ConfigSnapshot>) -> T,
    ) -> Result<T, StoreError> {
        let result = self.store.publish_locked(next);
        self.release(result.is_ok());
        let published = result?;
        Ok(after(&published))
    }

    fn release(&mut self, success: bool) {
        self.released = true;
        if success {
            self.created.clear();
            return;
        }
        for path in self.created.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed key file of aborted transaction"),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Removing key file of aborted transaction failed"
                ),
            }
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.release(false);
        }
    }
}
