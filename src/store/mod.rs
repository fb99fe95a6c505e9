//! The published configuration and its mutation lock.
//!
//! # Data Flow
//! ```text
//! readers:  snapshot()            → Arc<ConfigSnapshot> (lock-free load)
//!
//! writers:  begin_transaction()   → Transaction (holds the mutation lock)
//!               .base()           → snapshot the edit starts from
//!               .write_key_file() → tracked for rollback
//!               .publish(next)    → validate → round trip → persist → swap
//!               .commit(next, f)  → same, then f(published) under the lock
//!           drop / publish done   → rollback or commit, then unlock
//! ```
//!
//! # Design Decisions
//! - One mutex serializes all writers; it is not a reader/writer lock, and
//!   readers never touch it
//! - The published pointer is swapped only after the document is durable,
//!   so readers see the old or the new snapshot, never anything between

mod transaction;

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use thiserror::Error;

use crate::dynamic::persist::{round_trip, Persistence, PersistError};
use crate::dynamic::schema::ConfigSnapshot;
use crate::dynamic::validation::{validate_snapshot, ConfigIssue};
use crate::keys::KeyMaterialManager;
use crate::observability::metrics;

pub use transaction::Transaction;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid configuration: {}", issue_list(.0))]
    Invalid(Vec<ConfigIssue>),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Joins issues into one line for error messages.
pub fn issue_list(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Process-wide owner of the published configuration.
pub struct ConfigStore {
    current: ArcSwap<ConfigSnapshot>,
    lock: Mutex<()>,
    persistence: Box<dyn Persistence>,
    keys: KeyMaterialManager,
    postmaster_account: String,
}

impl ConfigStore {
    /// Loads the persisted document, or persists an empty configuration if
    /// there is none yet. Refuses a document that violates invariants.
    pub fn open(
        persistence: Box<dyn Persistence>,
        keys: KeyMaterialManager,
        postmaster_account: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let postmaster_account = postmaster_account.into();
        let snapshot = match persistence.parse()? {
            Some(snapshot) => snapshot,
            None => {
                let snapshot = ConfigSnapshot::default();
                persistence.persist(&snapshot)?;
                tracing::info!("No dynamic configuration found, wrote an empty one");
                snapshot
            }
        };
        validate_snapshot(&snapshot, &postmaster_account, Some(&keys)).map_err(StoreError::Invalid)?;

        tracing::info!(
            domains = snapshot.domains.len(),
            accounts = snapshot.accounts.len(),
            "Dynamic configuration loaded"
        );
        metrics::record_snapshot(&snapshot);

        Ok(Self {
            current: ArcSwap::from_pointee(snapshot),
            lock: Mutex::new(()),
            persistence,
            keys,
            postmaster_account,
        })
    }

    /// The currently published configuration. Never blocks.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    /// Waits for the mutation lock and starts a transaction on the
    /// snapshot published at that moment.
    pub fn begin_transaction(&self) -> Transaction<'_> {
        let guard = self.lock.lock();
        Transaction::new(self, guard, self.snapshot())
    }

    pub fn keys(&self) -> &KeyMaterialManager {
        &self.keys
    }

    pub fn postmaster_account(&self) -> &str {
        &self.postmaster_account
    }

    /// Validates, persists and swaps in `next`. Callers hold the lock.
    fn publish_locked(&self, next: ConfigSnapshot) -> Result<Arc<ConfigSnapshot>, StoreError> {
        validate_snapshot(&next, &self.postmaster_account, Some(&self.keys)).map_err(StoreError::Invalid)?;
        round_trip(&next)?;
        self.persistence.persist(&next)?;

        let next = Arc::new(next);
        self.current.store(next.clone());
        metrics::record_snapshot(&next);
        Ok(next)
    }
}
