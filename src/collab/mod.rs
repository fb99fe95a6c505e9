//! Narrow interfaces to the subsystems the admin operations consult.
//!
//! # Responsibilities
//! - Queue: outbound messages, webhooks and the suppression list, which
//!   account and address removal must drain or check
//! - Credentials: login credentials referencing addresses, and the account
//!   data stores that account removal marks for removal
//!
//! # Design Decisions
//! - Collaborators are injected as trait objects so tests can substitute
//!   fakes (see `memory.rs` for the in-process implementations)
//! - Calls are synchronous; the admin API invokes operations on the
//!   blocking thread pool

pub mod memory;

use thiserror::Error;

use crate::address::Address;

pub use memory::{MemoryCredentialStore, MemoryQueue};

/// Failure reported by a collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollabError {
    #[error("account {0:?} not found")]
    AccountNotFound(String),

    #[error("{0}")]
    Unavailable(String),
}

/// Selects queue entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    /// Only messages submitted by this account.
    pub account: Option<String>,
}

impl MessageFilter {
    pub fn account(name: &str) -> Self {
        Self {
            account: Some(name.to_string()),
        }
    }

    pub fn matches(&self, account: &str) -> bool {
        self.account.as_deref().map_or(true, |a| a == account)
    }
}

/// An outbound message waiting in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    pub id: u64,
    /// Account that submitted the message.
    pub account: String,
    /// SMTP MAIL FROM of the message.
    pub sender: Address,
}

/// An entry on an account's suppression list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suppression {
    pub account: String,
    pub base_address: Address,
}

/// A stored login credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Identifies the credential, e.g. a TLS public key fingerprint.
    pub fingerprint: String,
    pub account: String,
    pub login_address: String,
}

/// The outbound queue.
pub trait QueueService: Send + Sync {
    /// Fails messages matching `filter`, returning how many were failed.
    fn fail_messages(&self, filter: &MessageFilter) -> Result<usize, CollabError>;

    /// Cancels pending webhook calls matching `filter`.
    fn cancel_webhooks(&self, filter: &MessageFilter) -> Result<usize, CollabError>;

    fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<MessageSummary>, CollabError>;

    fn list_suppressions(&self, account: &str) -> Result<Vec<Suppression>, CollabError>;

    fn remove_suppression(&self, account: &str, address: &Address) -> Result<(), CollabError>;
}

/// Stored credentials and per-account data stores.
pub trait CredentialStore: Send + Sync {
    /// Login credentials, of `account` if given, of all accounts otherwise.
    fn list_login_credentials(&self, account: Option<&str>) -> Result<Vec<Credential>, CollabError>;

    fn open_account(&self, name: &str) -> Result<Box<dyn AccountHandle>, CollabError>;
}

/// An opened account data store.
pub trait AccountHandle: Send {
    /// Schedules the account's data for removal once the last handle closes.
    fn mark_for_removal(&self) -> Result<(), CollabError>;

    /// Ends all login sessions of the account.
    fn clear_sessions(&self) -> Result<(), CollabError>;

    fn close(self: Box<Self>);
}
