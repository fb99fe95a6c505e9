//! Account and destination address operations.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::address::{Address, DestinationAddress};
use crate::admin::{edit_account, edit_domain, Admin, AdminError, RequestError};
use crate::collab::{AccountHandle, MessageFilter};
use crate::consistency;
use crate::dynamic::index::{alias_memberships, canonical_key, AliasMembership, DestinationIndex};
use crate::dynamic::schema::{AccountConfig, AutomaticJunkFlags, ConfigSnapshot, Destination, JunkFilter};

const SUBJECT_PASS_PERIOD: Duration = Duration::from_secs(12 * 3600);

/// Configuration for a new account with a single destination `address`.
pub fn make_account_config(address: &Address) -> AccountConfig {
    AccountConfig {
        domain: address.domain.to_string(),
        destinations: BTreeMap::from([(address.to_string(), Destination::default())]),
        from_id_login_addresses: Vec::new(),
        rejects_mailbox: "Rejects".to_string(),
        junk_filter: Some(JunkFilter {
            threshold: 0.95,
            onegrams: true,
            twograms: false,
            max_power: 0.01,
            top_words: 10,
            ignore_words: 0.1,
            rare_words: 2,
        }),
        automatic_junk_flags: AutomaticJunkFlags {
            enabled: true,
            junk_mailbox_regexp: "^(junk|spam)".to_string(),
            neutral_mailbox_regexp: "^(inbox|neutral|postmaster|dmarc|tlsrpt|rejects)".to_string(),
        },
        subject_pass_period_secs: SUBJECT_PASS_PERIOD.as_secs(),
        no_custom_password: true,
    }
}

/// Canonical key of a destination map entry.
fn destination_key(snapshot: &ConfigSnapshot, key: &str) -> Option<String> {
    let dest = DestinationAddress::parse(key).ok()?;
    canonical_key(snapshot, &dest)
}

/// Clears the login sessions of an opened account store and closes it
/// when dropped, whether or not the removal went through.
struct OpenAccount(Option<Box<dyn AccountHandle>>);

impl OpenAccount {
    fn handle(&self) -> Option<&dyn AccountHandle> {
        self.0.as_deref()
    }
}

impl Drop for OpenAccount {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            if let Err(e) = handle.clear_sessions() {
                tracing::warn!(error = %e, "Clearing account login sessions failed");
            }
            handle.close();
        }
    }
}

impl Admin {
    /// Account `name` in the current configuration, with the aliases it is
    /// a member of.
    pub fn account_get(&self, name: &str) -> Result<(AccountConfig, Vec<AliasMembership>), RequestError> {
        let snapshot = self.store.snapshot();
        let account = snapshot
            .account(name)
            .cloned()
            .ok_or_else(|| RequestError::UnknownAccount(name.to_string()))?;
        let (index, _) = DestinationIndex::build(&snapshot, self.store.postmaster_account());
        Ok((account, alias_memberships(&snapshot, &index, name)))
    }

    /// Adds account `name` with `address` as its only destination.
    pub fn account_add(&self, name: &str, address: &Address) -> Result<(), AdminError> {
        let _span = tracing::info_span!("account_add", account = name, %address).entered();
        self.run("account_add", || {
            consistency::check_account_name(name)?;

            let tx = self.store.begin_transaction();
            if tx.base().accounts.contains_key(name) {
                return Err(RequestError::AccountExists(name.to_string()).into());
            }
            let dir = self.settings.data_dir.join("accounts").join(name);
            if dir.exists() {
                return Err(RequestError::AccountDirExists {
                    account: name.to_string(),
                    path: dir.display().to_string(),
                }
                .into());
            }
            let (index, _) = DestinationIndex::build(tx.base(), tx.postmaster_account());
            consistency::check_address_available(tx.base(), &index, address)?;

            let next = tx.base().with_account(name, make_account_config(address));
            tx.publish(next)?;
            tracing::info!("Account added");
            Ok(())
        })
    }

    /// Removes account `name` after failing its queued messages, cancelling
    /// its webhooks and dropping its suppressions.
    ///
    /// The account's data store is marked for removal and deleted when its
    /// last handle closes. If any of the queue steps fails the configuration
    /// is left untouched.
    pub fn account_remove(&self, name: &str) -> Result<(), AdminError> {
        let _span = tracing::info_span!("account_remove", account = name).entered();
        self.run("account_remove", || {
            if !self.store.snapshot().accounts.contains_key(name) {
                return Err(RequestError::UnknownAccount(name.to_string()).into());
            }

            let opened = OpenAccount(Some(
                self.credentials
                    .open_account(name)
                    .map_err(|e| AdminError::internal("opening account", e))?,
            ));

            let filter = MessageFilter::account(name);
            let failed = self
                .queue
                .fail_messages(&filter)
                .map_err(|e| AdminError::internal("failing queued messages", e))?;
            let cancelled = self
                .queue
                .cancel_webhooks(&filter)
                .map_err(|e| AdminError::internal("cancelling webhooks", e))?;
            let suppressions = self
                .queue
                .list_suppressions(name)
                .map_err(|e| AdminError::internal("listing suppressions", e))?;
            for sup in &suppressions {
                self.queue
                    .remove_suppression(name, &sup.base_address)
                    .map_err(|e| AdminError::internal("removing suppression", e))?;
            }
            tracing::debug!(
                failed,
                cancelled,
                suppressions = suppressions.len(),
                "Drained queue state of account"
            );

            let tx = self.store.begin_transaction();
            if !tx.base().accounts.contains_key(name) {
                return Err(RequestError::UnknownAccount(name.to_string()).into());
            }
            let next = tx.base().without_account(name);
            tx.publish(next)?;

            if let Some(handle) = opened.handle() {
                handle
                    .mark_for_removal()
                    .map_err(|e| AdminError::internal("marking account for removal", e))?;
            }
            tracing::info!("Account removed");
            Ok(())
        })
    }

    /// Adds `dest` to the destinations of `account`. A catchall gives the
    /// account all otherwise undeliverable mail for the domain.
    pub fn address_add(&self, dest: &DestinationAddress, account: &str) -> Result<(), AdminError> {
        let _span = tracing::info_span!("address_add", address = %dest, account).entered();
        self.run("address_add", || {
            let tx = self.store.begin_transaction();
            if !tx.base().accounts.contains_key(account) {
                return Err(RequestError::UnknownAccount(account.to_string()).into());
            }
            let (index, _) = DestinationIndex::build(tx.base(), tx.postmaster_account());
            match dest {
                DestinationAddress::Address(addr) => {
                    consistency::check_address_available(tx.base(), &index, addr)?;
                }
                DestinationAddress::Catchall(domain) => {
                    consistency::check_catchall_available(tx.base(), &index, domain)?;
                }
            }

            // Stored as written; lookups canonicalize.
            let next = edit_account(tx.base(), account, |acc| {
                acc.destinations.insert(dest.to_string(), Destination::default());
                Ok(())
            })?;
            tx.publish(next)?;
            tracing::info!("Address added");
            Ok(())
        })
    }

    /// Removes `dest` from the account it belongs to, along with matching
    /// login addresses and alias memberships.
    pub fn address_remove(&self, dest: &DestinationAddress) -> Result<(), AdminError> {
        let _span = tracing::info_span!("address_remove", address = %dest).entered();
        self.run("address_remove", || {
            let tx = self.store.begin_transaction();
            let base = tx.base().clone();
            let (index, _) = DestinationIndex::build(&base, tx.postmaster_account());

            let owner = canonical_key(&base, dest)
                .and_then(|key| index.get(&key))
                .map(|ad| ad.account.clone());
            let (credentials, queued) = match &owner {
                Some(account) => (
                    self.credentials
                        .list_login_credentials(Some(account))
                        .map_err(|e| AdminError::internal("listing login credentials", e))?,
                    self.queue
                        .list_messages(&MessageFilter::account(account))
                        .map_err(|e| AdminError::internal("listing queued messages", e))?,
                ),
                None => (Vec::new(), Vec::new()),
            };

            let plan = consistency::plan_address_removal(&base, &index, dest, &credentials, &queued)?;

            let mut next = edit_account(&base, &plan.account, |acc| {
                let before = acc.destinations.len();
                acc.destinations
                    .retain(|k, _| destination_key(&base, k).as_deref() != Some(plan.key.as_str()));
                if acc.destinations.len() == before {
                    return Err(RequestError::NotRemoved {
                        address: plan.key.clone(),
                    }
                    .into());
                }
                acc.from_id_login_addresses = plan.login_addresses.clone();
                Ok(())
            })?;
            for ((domain, localpart), alias) in plan.aliases {
                next = edit_domain(&next, &domain, |dc| {
                    dc.aliases.insert(localpart, alias);
                    Ok(())
                })?;
            }

            tx.publish(next)?;
            tracing::info!(account = %plan.account, "Address removed");
            Ok(())
        })
    }
}
