//! In-process collaborator implementations.
//!
//! Used by the daemon when no external queue or account store is wired in,
//! and by tests to observe what the admin operations drained or marked.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::address::Address;
use crate::collab::{
    AccountHandle, CollabError, Credential, CredentialStore, MessageFilter, MessageSummary, QueueService,
    Suppression,
};

/// Outbound queue kept in memory.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    messages: Arc<DashMap<u64, MessageSummary>>,
    /// Webhook id → account.
    webhooks: Arc<DashMap<u64, String>>,
    suppressions: Arc<DashMap<(String, String), Suppression>>,
    next_id: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a message from `account`, returning its id.
    pub fn enqueue(&self, account: &str, sender: Address) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.messages.insert(
            id,
            MessageSummary {
                id,
                account: account.to_string(),
                sender,
            },
        );
        id
    }

    pub fn add_webhook(&self, account: &str) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.webhooks.insert(id, account.to_string());
        id
    }

    pub fn suppress(&self, account: &str, base_address: Address) {
        self.suppressions.insert(
            (account.to_string(), base_address.to_string()),
            Suppression {
                account: account.to_string(),
                base_address,
            },
        );
    }

    /// Makes every call fail, to exercise fail-closed paths.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn webhook_count(&self) -> usize {
        self.webhooks.len()
    }

    fn check(&self) -> Result<(), CollabError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(CollabError::Unavailable("queue unavailable".to_string()));
        }
        Ok(())
    }
}

impl QueueService for MemoryQueue {
    fn fail_messages(&self, filter: &MessageFilter) -> Result<usize, CollabError> {
        self.check()?;
        let before = self.messages.len();
        self.messages.retain(|_, m| !filter.matches(&m.account));
        Ok(before - self.messages.len())
    }

    fn cancel_webhooks(&self, filter: &MessageFilter) -> Result<usize, CollabError> {
        self.check()?;
        let before = self.webhooks.len();
        self.webhooks.retain(|_, account| !filter.matches(account));
        Ok(before - self.webhooks.len())
    }

    fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<MessageSummary>, CollabError> {
        self.check()?;
        let mut out: Vec<MessageSummary> = self
            .messages
            .iter()
            .filter(|m| filter.matches(&m.account))
            .map(|m| m.value().clone())
            .collect();
        out.sort_by_key(|m| m.id);
        Ok(out)
    }

    fn list_suppressions(&self, account: &str) -> Result<Vec<Suppression>, CollabError> {
        self.check()?;
        Ok(self
            .suppressions
            .iter()
            .filter(|s| s.account == account)
            .map(|s| s.value().clone())
            .collect())
    }

    fn remove_suppression(&self, account: &str, address: &Address) -> Result<(), CollabError> {
        self.check()?;
        self.suppressions.remove(&(account.to_string(), address.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AccountState {
    open_handles: AtomicUsize,
    marked: AtomicBool,
    sessions: AtomicUsize,
}

/// Credentials and account stores kept in memory.
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    /// Fingerprint → credential.
    credentials: Arc<DashMap<String, Credential>>,
    accounts: Arc<DashMap<String, Arc<AccountState>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_credential(&self, fingerprint: &str, account: &str, login_address: &str) {
        self.credentials.insert(
            fingerprint.to_string(),
            Credential {
                fingerprint: fingerprint.to_string(),
                account: account.to_string(),
                login_address: login_address.to_string(),
            },
        );
    }

    pub fn remove_credential(&self, fingerprint: &str) {
        self.credentials.remove(fingerprint);
    }

    /// True once the account was marked for removal, whether or not its
    /// data has been dropped yet.
    pub fn is_marked_for_removal(&self, account: &str) -> bool {
        self.accounts
            .get(account)
            .is_some_and(|a| a.marked.load(Ordering::Acquire))
    }

    /// Records a login session of `account`.
    pub fn add_session(&self, account: &str) {
        let state = self.accounts.entry(account.to_string()).or_default().clone();
        state.sessions.fetch_add(1, Ordering::AcqRel);
    }

    pub fn sessions(&self, account: &str) -> usize {
        self.accounts
            .get(account)
            .map_or(0, |a| a.sessions.load(Ordering::Acquire))
    }

    pub fn open_handles(&self, account: &str) -> usize {
        self.accounts
            .get(account)
            .map_or(0, |a| a.open_handles.load(Ordering::Acquire))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn list_login_credentials(&self, account: Option<&str>) -> Result<Vec<Credential>, CollabError> {
        let mut out: Vec<Credential> = self
            .credentials
            .iter()
            .filter(|c| account.map_or(true, |a| c.account == a))
            .map(|c| c.value().clone())
            .collect();
        out.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok(out)
    }

    fn open_account(&self, name: &str) -> Result<Box<dyn AccountHandle>, CollabError> {
        let state = self.accounts.entry(name.to_string()).or_default().clone();
        state.open_handles.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MemoryAccountHandle {
            name: name.to_string(),
            state,
            credentials: self.credentials.clone(),
        }))
    }
}

struct MemoryAccountHandle {
    name: String,
    state: Arc<AccountState>,
    credentials: Arc<DashMap<String, Credential>>,
}

impl AccountHandle for MemoryAccountHandle {
    fn mark_for_removal(&self) -> Result<(), CollabError> {
        self.state.marked.store(true, Ordering::Release);
        Ok(())
    }

    fn clear_sessions(&self) -> Result<(), CollabError> {
        self.state.sessions.store(0, Ordering::Release);
        Ok(())
    }

    fn close(self: Box<Self>) {
        let remaining = self.state.open_handles.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 && self.state.marked.load(Ordering::Acquire) {
            self.credentials.retain(|_, c| c.account != self.name);
            tracing::info!(account = %self.name, "Removed data of account marked for removal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    #[test]
    fn test_queue_filters_by_account() {
        let q = MemoryQueue::new();
        q.enqueue("mjl", addr("mjl@example.org"));
        q.enqueue("other", addr("other@example.org"));
        q.add_webhook("mjl");

        let listed = q.list_messages(&MessageFilter::account("mjl")).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].sender, addr("mjl@example.org"));

        assert_eq!(q.fail_messages(&MessageFilter::account("mjl")).unwrap(), 1);
        assert_eq!(q.cancel_webhooks(&MessageFilter::account("mjl")).unwrap(), 1);
        assert_eq!(q.message_count(), 1);
    }

    #[test]
    fn test_queue_unavailable() {
        let q = MemoryQueue::new();
        q.set_unavailable(true);
        assert!(q.list_messages(&MessageFilter::default()).is_err());
        q.set_unavailable(false);
        assert!(q.list_messages(&MessageFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_suppressions() {
        let q = MemoryQueue::new();
        q.suppress("mjl", addr("bounce@remote.example"));
        assert_eq!(q.list_suppressions("mjl").unwrap().len(), 1);
        q.remove_suppression("mjl", &addr("bounce@remote.example")).unwrap();
        assert!(q.list_suppressions("mjl").unwrap().is_empty());
    }

    #[test]
    fn test_account_removed_after_last_close() {
        let store = MemoryCredentialStore::new();
        store.add_credential("fp1", "mjl", "mjl@example.org");

        let a = store.open_account("mjl").unwrap();
        let b = store.open_account("mjl").unwrap();
        a.mark_for_removal().unwrap();
        a.close();
        assert_eq!(store.list_login_credentials(Some("mjl")).unwrap().len(), 1);
        b.close();
        assert!(store.list_login_credentials(Some("mjl")).unwrap().is_empty());
        assert!(store.is_marked_for_removal("mjl"));
        assert_eq!(store.open_handles("mjl"), 0);
    }

    #[test]
    fn test_clear_sessions() {
        let store = MemoryCredentialStore::new();
        store.add_session("mjl");
        store.add_session("mjl");
        store.add_session("other");
        assert_eq!(store.sessions("mjl"), 2);

        let handle = store.open_account("mjl").unwrap();
        handle.clear_sessions().unwrap();
        handle.close();
        assert_eq!(store.sessions("mjl"), 0);
        assert_eq!(store.sessions("other"), 1);
    }
}
