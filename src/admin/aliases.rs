//! Alias operations.

use crate::address::Address;
use crate::admin::{edit_domain, Admin, AdminError, RequestError};
use crate::consistency;
use crate::dynamic::index::{canonical_localpart, DestinationIndex};
use crate::dynamic::schema::{Alias, AliasSettings, ConfigSnapshot};

/// Canonical local-part and full key of alias `address`.
fn alias_key(snapshot: &ConfigSnapshot, address: &Address) -> Result<(String, String), RequestError> {
    let dc = snapshot
        .domain(address.domain.name())
        .ok_or_else(|| RequestError::UnknownDomain(address.domain.to_string()))?;
    let lp = canonical_localpart(address.localpart.as_str(), dc);
    let key = format!("{lp}@{}", address.domain);
    Ok((lp, key))
}

/// The existing alias at `address`.
fn existing_alias<'a>(snapshot: &'a ConfigSnapshot, address: &Address) -> Result<(String, String, &'a Alias), RequestError> {
    let (lp, key) = alias_key(snapshot, address)?;
    let alias = snapshot
        .domain(address.domain.name())
        .and_then(|dc| dc.aliases.get(&lp))
        .ok_or_else(|| RequestError::UnknownAlias(key.clone()))?;
    Ok((lp, key, alias))
}

impl Admin {
    /// The alias at `address` in the current configuration.
    pub fn alias_get(&self, address: &Address) -> Result<Alias, RequestError> {
        let snapshot = self.store.snapshot();
        let (_, _, alias) = existing_alias(&snapshot, address)?;
        Ok(alias.clone())
    }

    /// Adds an alias at `address`. Members must be existing destinations.
    pub fn alias_add(&self, address: &Address, alias: Alias) -> Result<(), AdminError> {
        let _span = tracing::info_span!("alias_add", %address, members = alias.addresses.len()).entered();
        self.run("alias_add", || {
            let tx = self.store.begin_transaction();
            let (index, _) = DestinationIndex::build(tx.base(), tx.postmaster_account());
            let (lp, members) = consistency::check_alias_addition(tx.base(), &index, address, &alias.addresses)?;

            let next = edit_domain(tx.base(), address.domain.name(), |dc| {
                dc.aliases.insert(
                    lp,
                    Alias {
                        addresses: members,
                        ..alias
                    },
                );
                Ok(())
            })?;
            tx.publish(next)?;
            tracing::info!("Alias added");
            Ok(())
        })
    }

    /// Changes the flags of the alias at `address`; members are kept.
    pub fn alias_update(&self, address: &Address, settings: AliasSettings) -> Result<(), AdminError> {
        let _span = tracing::info_span!("alias_update", %address).entered();
        self.run("alias_update", || {
            let tx = self.store.begin_transaction();
            let (lp, _, _) = existing_alias(tx.base(), address)?;

            let next = edit_domain(tx.base(), address.domain.name(), |dc| {
                if let Some(a) = dc.aliases.get_mut(&lp) {
                    a.post_public = settings.post_public;
                    a.list_members = settings.list_members;
                    a.allow_msg_from = settings.allow_msg_from;
                }
                Ok(())
            })?;
            tx.publish(next)?;
            tracing::info!("Alias updated");
            Ok(())
        })
    }

    pub fn alias_remove(&self, address: &Address) -> Result<(), AdminError> {
        let _span = tracing::info_span!("alias_remove", %address).entered();
        self.run("alias_remove", || {
            let tx = self.store.begin_transaction();
            let (lp, _, _) = existing_alias(tx.base(), address)?;

            let next = edit_domain(tx.base(), address.domain.name(), |dc| {
                dc.aliases.remove(&lp);
                Ok(())
            })?;
            tx.publish(next)?;
            tracing::info!("Alias removed");
            Ok(())
        })
    }

    /// Appends `members` to the alias at `address`.
    pub fn alias_addresses_add(&self, address: &Address, members: &[String]) -> Result<(), AdminError> {
        let _span = tracing::info_span!("alias_addresses_add", %address, count = members.len()).entered();
        self.run("alias_addresses_add", || {
            if members.is_empty() {
                return Err(RequestError::Invalid("at least one address required".to_string()).into());
            }
            let tx = self.store.begin_transaction();
            let (index, _) = DestinationIndex::build(tx.base(), tx.postmaster_account());
            let (lp, key, alias) = existing_alias(tx.base(), address)?;
            let added = consistency::check_new_members(tx.base(), &index, &key, &alias.addresses, members)?;

            let next = edit_domain(tx.base(), address.domain.name(), |dc| {
                if let Some(a) = dc.aliases.get_mut(&lp) {
                    a.addresses.extend(added);
                }
                Ok(())
            })?;
            tx.publish(next)?;
            tracing::info!("Alias members added");
            Ok(())
        })
    }

    /// Removes `members` from the alias at `address`. The last member
    /// cannot be removed; remove the alias instead.
    pub fn alias_addresses_remove(&self, address: &Address, members: &[String]) -> Result<(), AdminError> {
        let _span = tracing::info_span!("alias_addresses_remove", %address, count = members.len()).entered();
        self.run("alias_addresses_remove", || {
            let tx = self.store.begin_transaction();
            let (lp, key, alias) = existing_alias(tx.base(), address)?;
            let remaining = consistency::remove_alias_members(tx.base(), &key, alias, members)?;

            let next = edit_domain(tx.base(), address.domain.name(), |dc| {
                if let Some(a) = dc.aliases.get_mut(&lp) {
                    a.addresses = remaining;
                }
                Ok(())
            })?;
            tx.publish(next)?;
            tracing::info!("Alias members removed");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Domain, Localpart};
    use crate::dynamic::schema::DomainConfig;

    #[test]
    fn test_alias_lookup_is_canonical() {
        let mut dc = DomainConfig::default();
        dc.aliases.insert(
            "team".to_string(),
            Alias {
                addresses: vec!["mjl@example.org".to_string()],
                ..Default::default()
            },
        );
        let snap = ConfigSnapshot::default().with_domain("example.org", dc);
        let addr = Address::new(Localpart::parse("Team").unwrap(), Domain::parse("example.org").unwrap());

        let (lp, key, alias) = existing_alias(&snap, &addr).unwrap();
        assert_eq!(lp, "team");
        assert_eq!(key, "team@example.org");
        assert_eq!(alias.addresses.len(), 1);

        let other = Address::new(Localpart::parse("sales").unwrap(), Domain::parse("example.org").unwrap());
        assert_eq!(
            existing_alias(&snap, &other).unwrap_err(),
            RequestError::UnknownAlias("sales@example.org".to_string())
        );
    }
}
