//! Administrative operations on the dynamic configuration.
//!
//! # Data Flow
//! ```text
//! caller (HTTP API, CLI, tests)
//!     → Admin::<operation>(typed arguments)
//!         → collaborator drains that must see the old config (account removal)
//!         → store.begin_transaction()        (mutation lock)
//!         → consistency checks against tx.base()
//!         → key files written through the transaction
//!         → tx.publish(next)                 (validate, persist, swap)
//!         → retire orphaned key files        (after publish, lock still held)
//!     → Ok(()) | AdminError::{Request, Internal}
//! ```
//!
//! # Design Decisions
//! - One handler per action, each a synchronous call
//! - Each handler logs its own failure once and records an outcome metric
//! - Generic `*_save` entry points take a closure editing a private copy of
//!   one record; its error aborts the transaction like any other

mod accounts;
mod aliases;
mod domains;
mod error;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::address::Domain;
use crate::collab::{CredentialStore, QueueService};
use crate::dynamic::schema::{AccountConfig, ConfigSnapshot, DomainConfig};
use crate::observability::metrics::{self, Outcome};
use crate::store::ConfigStore;

pub use accounts::make_account_config;
pub use domains::{make_domain_config, DkimAddParams};
pub use error::{AdminError, RequestError};

/// Server settings the operations depend on.
#[derive(Debug, Clone)]
pub struct AdminSettings {
    /// Host name of this mail server, listed as MX in new MTA-STS policies.
    pub hostname: Domain,

    /// Data directory holding per-account stores under `accounts/`.
    pub data_dir: PathBuf,

    /// Whether new domains get an MTA-STS policy.
    pub mta_sts_enabled: bool,
}

/// Entry point for all configuration changes.
pub struct Admin {
    store: Arc<ConfigStore>,
    queue: Arc<dyn QueueService>,
    credentials: Arc<dyn CredentialStore>,
    settings: AdminSettings,
}

impl Admin {
    pub fn new(
        store: Arc<ConfigStore>,
        queue: Arc<dyn QueueService>,
        credentials: Arc<dyn CredentialStore>,
        settings: AdminSettings,
    ) -> Self {
        Self {
            store,
            queue,
            credentials,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn settings(&self) -> &AdminSettings {
        &self.settings
    }

    /// The current configuration.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.store.snapshot()
    }

    /// Runs operation `op`, logging a failure and recording its outcome.
    fn run<T>(&self, op: &'static str, f: impl FnOnce() -> Result<T, AdminError>) -> Result<T, AdminError> {
        let start = Instant::now();
        let result = f();
        let outcome = match &result {
            Ok(_) => Outcome::Ok,
            Err(AdminError::Request(e)) => {
                tracing::warn!(operation = op, error = %e, "Admin request rejected");
                Outcome::Rejected
            }
            Err(e) => {
                tracing::error!(operation = op, error = %e, "Admin operation failed");
                Outcome::Failed
            }
        };
        metrics::record_operation(op, outcome, start);
        result
    }

    /// Edits a copy of domain `name` with `edit` and publishes the result.
    pub fn domain_save<F>(&self, name: &str, edit: F) -> Result<(), AdminError>
    where
        F: FnOnce(&mut DomainConfig) -> Result<(), AdminError>,
    {
        let _span = tracing::info_span!("domain_save", domain = name).entered();
        self.run("domain_save", || {
            let tx = self.store.begin_transaction();
            let next = edit_domain(tx.base(), name, edit)?;
            tx.publish(next)?;
            tracing::info!("Domain saved");
            Ok(())
        })
    }

    /// Edits a copy of account `name` with `edit` and publishes the result.
    pub fn account_save<F>(&self, name: &str, edit: F) -> Result<(), AdminError>
    where
        F: FnOnce(&mut AccountConfig) -> Result<(), AdminError>,
    {
        let _span = tracing::info_span!("account_save", account = name).entered();
        self.run("account_save", || {
            let tx = self.store.begin_transaction();
            let next = edit_account(tx.base(), name, edit)?;
            tx.publish(next)?;
            tracing::info!("Account saved");
            Ok(())
        })
    }

    /// Edits a copy of the whole configuration and publishes the result.
    ///
    /// The copy shares all records with the published snapshot; `edit`
    /// replaces the records it changes through the snapshot's `with_*`
    /// methods or the maps' `update`.
    pub fn config_save<F>(&self, edit: F) -> Result<(), AdminError>
    where
        F: FnOnce(&mut ConfigSnapshot) -> Result<(), AdminError>,
    {
        let _span = tracing::info_span!("config_save").entered();
        self.run("config_save", || {
            let tx = self.store.begin_transaction();
            let mut next = ConfigSnapshot::clone(tx.base());
            edit(&mut next)?;
            tx.publish(next)?;
            tracing::info!("Config saved");
            Ok(())
        })
    }
}

/// `base` with domain `name` replaced by an edited copy.
fn edit_domain<F>(base: &ConfigSnapshot, name: &str, edit: F) -> Result<ConfigSnapshot, AdminError>
where
    F: FnOnce(&mut DomainConfig) -> Result<(), AdminError>,
{
    let domains = base
        .domains
        .update(name, edit)
        .ok_or_else(|| AdminError::from(RequestError::UnknownDomain(name.to_string())))??;
    Ok(ConfigSnapshot {
        domains,
        accounts: base.accounts.clone(),
    })
}

/// `base` with account `name` replaced by an edited copy.
fn edit_account<F>(base: &ConfigSnapshot, name: &str, edit: F) -> Result<ConfigSnapshot, AdminError>
where
    F: FnOnce(&mut AccountConfig) -> Result<(), AdminError>,
{
    let accounts = base
        .accounts
        .update(name, edit)
        .ok_or_else(|| AdminError::from(RequestError::UnknownAccount(name.to_string())))??;
    Ok(ConfigSnapshot {
        domains: base.domains.clone(),
        accounts,
    })
}
