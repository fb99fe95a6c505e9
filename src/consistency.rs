//! Cross-entity checks gating additions and removals.
//!
//! # Responsibilities
//! - Decide whether a proposed change may proceed, given the snapshot it
//!   starts from and the views reported by the queue and credential store
//! - Compute the derived edits a removal implies (alias members, login
//!   addresses) so handlers only assemble the new snapshot
//!
//! # Design Decisions
//! - Pure functions: collaborators are queried by the caller and passed in
//! - Every rejection is a [`RequestError`] naming what to fix

use std::collections::BTreeMap;

use crate::address::{Address, DestinationAddress, Domain, Localpart};
use crate::admin::RequestError;
use crate::collab::{Credential, MessageSummary};
use crate::dynamic::index::{canonical_key, canonical_localpart, DestinationIndex, DestinationRole};
use crate::dynamic::schema::{Alias, ConfigSnapshot, DkimAlgorithm, DkimHash, DomainConfig, Selector};

fn domain_config<'a>(snapshot: &'a ConfigSnapshot, domain: &Domain) -> Result<&'a DomainConfig, RequestError> {
    snapshot
        .domain(domain.name())
        .ok_or_else(|| RequestError::UnknownDomain(domain.to_string()))
}

fn member_key(snapshot: &ConfigSnapshot, member: &str) -> Result<String, RequestError> {
    let addr = Address::parse(member)?;
    canonical_key(snapshot, &DestinationAddress::Address(addr.clone()))
        .ok_or_else(|| RequestError::UnknownDomain(addr.domain.to_string()))
}

pub fn check_domain_addition(snapshot: &ConfigSnapshot, domain: &Domain) -> Result<(), RequestError> {
    if snapshot.domains.contains_key(domain.name()) {
        return Err(RequestError::DomainExists(domain.clone()));
    }
    Ok(())
}

/// Rejects removing a domain that stored credentials still log in with.
pub fn check_domain_removal(
    snapshot: &ConfigSnapshot,
    domain: &Domain,
    credentials: &[Credential],
) -> Result<(), RequestError> {
    domain_config(snapshot, domain)?;
    let suffix = format!("@{}", domain.name());
    for cred in credentials {
        if cred.login_address.to_ascii_lowercase().ends_with(&suffix) {
            return Err(RequestError::DomainInUse {
                domain: domain.to_string(),
                address: cred.login_address.clone(),
                fingerprint: cred.fingerprint.clone(),
            });
        }
    }
    Ok(())
}

/// Account names end up in file system paths.
pub fn check_account_name(name: &str) -> Result<(), RequestError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control);
    if !valid {
        return Err(RequestError::Invalid(format!("invalid account name {name:?}")));
    }
    Ok(())
}

/// Checks that `address` can become a new destination, returning its
/// canonical key.
pub fn check_address_available(
    snapshot: &ConfigSnapshot,
    index: &DestinationIndex,
    address: &Address,
) -> Result<String, RequestError> {
    let dc = domain_config(snapshot, &address.domain)?;
    let lp = canonical_localpart(address.localpart.as_str(), dc);
    let key = format!("{lp}@{}", address.domain);
    if index.contains(&key) {
        return Err(RequestError::AddressExists(key));
    }
    for sep in dc.localpart_catchall_separators.iter().filter(|s| !s.is_empty()) {
        if address.localpart.as_str().contains(sep.as_str()) {
            return Err(RequestError::CatchallSeparator {
                address: address.to_string(),
                separator: sep.clone(),
            });
        }
    }
    if dc.aliases.contains_key(&lp) {
        return Err(RequestError::AddressIsAlias(key));
    }
    Ok(key)
}

/// Checks that `domain` can get a catchall destination.
pub fn check_catchall_available(
    snapshot: &ConfigSnapshot,
    index: &DestinationIndex,
    domain: &Domain,
) -> Result<String, RequestError> {
    domain_config(snapshot, domain)?;
    let key = format!("@{domain}");
    if index.contains(&key) {
        return Err(RequestError::AddressExists(key));
    }
    Ok(key)
}

/// What removing a destination implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRemoval {
    /// Canonical key of the removed destination.
    pub key: String,
    pub account: String,
    /// Login addresses of the account that stay.
    pub login_addresses: Vec<String>,
    /// Aliases the address was a member of, with their remaining members,
    /// keyed by (domain, alias local-part).
    pub aliases: BTreeMap<(String, String), Alias>,
}

/// Plans removal of `dest`.
///
/// `credentials` are the login credentials of the owning account and
/// `queued` its queued messages, both as reported before the change.
pub fn plan_address_removal(
    snapshot: &ConfigSnapshot,
    index: &DestinationIndex,
    dest: &DestinationAddress,
    credentials: &[Credential],
    queued: &[MessageSummary],
) -> Result<AddressRemoval, RequestError> {
    let key = canonical_key(snapshot, dest).ok_or_else(|| RequestError::UnknownDomain(dest.domain().to_string()))?;
    let ad = index
        .get(&key)
        .ok_or_else(|| RequestError::UnknownAddress(dest.to_string()))?;
    if ad.role != DestinationRole::Configured {
        return Err(RequestError::ReservedAddress {
            address: key,
            role: ad.role,
        });
    }
    let account = ad.account.clone();
    let resolves_here = |addr: &Address| index.resolve(snapshot, addr).is_some_and(|(k, _)| k == key);

    for cred in credentials {
        let Ok(login) = Address::parse(&cred.login_address) else {
            continue;
        };
        if resolves_here(&login) {
            return Err(RequestError::CredentialInUse {
                address: cred.login_address.clone(),
                fingerprint: cred.fingerprint.clone(),
            });
        }
    }

    let dependent = queued.iter().filter(|m| resolves_here(&m.sender)).count();
    if dependent > 0 {
        let covered = match dest {
            DestinationAddress::Catchall(_) => false,
            DestinationAddress::Address(a) => index
                .get(&format!("@{}", a.domain))
                .is_some_and(|c| c.account == account),
        };
        if !covered {
            return Err(RequestError::QueuedMessages {
                address: key,
                count: dependent,
            });
        }
    }

    let login_addresses = snapshot
        .account(&account)
        .map(|acc| {
            acc.from_id_login_addresses
                .iter()
                .filter(|l| Address::parse(l).map_or(true, |a| !resolves_here(&a)))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let mut aliases = BTreeMap::new();
    for (domain_name, dc) in snapshot.domains.iter() {
        for (alias_lp, alias) in &dc.aliases {
            let remaining: Vec<String> = alias
                .addresses
                .iter()
                .filter(|m| member_key(snapshot, m).map_or(true, |k| k != key))
                .cloned()
                .collect();
            if remaining.len() == alias.addresses.len() {
                continue;
            }
            if remaining.is_empty() {
                return Err(RequestError::LastAliasMember {
                    alias: format!("{alias_lp}@{domain_name}"),
                    address: key,
                });
            }
            aliases.insert(
                (domain_name.clone(), alias_lp.clone()),
                Alias {
                    addresses: remaining,
                    ..alias.clone()
                },
            );
        }
    }

    Ok(AddressRemoval {
        key,
        account,
        login_addresses,
        aliases,
    })
}

/// Checks a new alias, returning its canonical local-part and normalized
/// member list.
pub fn check_alias_addition(
    snapshot: &ConfigSnapshot,
    index: &DestinationIndex,
    address: &Address,
    members: &[String],
) -> Result<(String, Vec<String>), RequestError> {
    let dc = domain_config(snapshot, &address.domain)?;
    let lp = canonical_localpart(address.localpart.as_str(), dc);
    Localpart::parse(&lp)?;
    let key = format!("{lp}@{}", address.domain);
    if dc.aliases.contains_key(&lp) {
        return Err(RequestError::AliasExists(key));
    }
    if index.contains(&key) {
        return Err(RequestError::AddressExists(key));
    }
    if members.is_empty() {
        return Err(RequestError::EmptyAlias);
    }
    let members = check_new_members(snapshot, index, &key, &[], members)?;
    Ok((lp, members))
}

/// Validates members to add to alias `alias_key` that already has
/// `existing` members. Returns the normalized new members.
pub fn check_new_members(
    snapshot: &ConfigSnapshot,
    index: &DestinationIndex,
    alias_key: &str,
    existing: &[String],
    added: &[String],
) -> Result<Vec<String>, RequestError> {
    let mut keys = existing
        .iter()
        .filter_map(|m| member_key(snapshot, m).ok())
        .collect::<Vec<_>>();
    let mut out = Vec::with_capacity(added.len());
    for member in added {
        let addr = Address::parse(member)?;
        let key = member_key(snapshot, member)?;
        if key == alias_key {
            return Err(RequestError::Invalid(format!("alias {alias_key} cannot be a member of itself")));
        }
        if keys.contains(&key) {
            return Err(RequestError::AliasMemberExists {
                alias: alias_key.to_string(),
                address: addr.to_string(),
            });
        }
        if !index.contains(&key) {
            return Err(RequestError::UnknownAddress(addr.to_string()));
        }
        keys.push(key);
        out.push(addr.to_string());
    }
    Ok(out)
}

/// Members left after removing `removed` from `alias`. Every removed
/// address must be a member, and at least one member must remain.
pub fn remove_alias_members(
    snapshot: &ConfigSnapshot,
    alias_key: &str,
    alias: &Alias,
    removed: &[String],
) -> Result<Vec<String>, RequestError> {
    if removed.is_empty() {
        return Err(RequestError::Invalid("at least one address required".to_string()));
    }
    let mut remaining = alias.addresses.clone();
    for member in removed {
        let key = member_key(snapshot, member)?;
        let before = remaining.len();
        remaining.retain(|m| member_key(snapshot, m).map_or(true, |k| k != key));
        if remaining.len() == before {
            return Err(RequestError::UnknownAliasMember {
                alias: alias_key.to_string(),
                address: member.clone(),
            });
        }
    }
    if remaining.is_empty() {
        return Err(RequestError::EmptyAlias);
    }
    Ok(remaining)
}

/// Parses the algorithm and hash names accepted for new selectors.
pub fn parse_dkim_params(algorithm: &str, hash: &str) -> Result<(DkimAlgorithm, DkimHash), RequestError> {
    let hash = hash.parse::<DkimHash>().map_err(RequestError::UnsupportedHash)?;
    let algorithm = algorithm
        .parse::<DkimAlgorithm>()
        .map_err(RequestError::UnsupportedAlgorithm)?;
    Ok((algorithm, hash))
}

pub fn check_dkim_addition(
    snapshot: &ConfigSnapshot,
    domain: &Domain,
    selector: &Domain,
) -> Result<(), RequestError> {
    let dc = domain_config(snapshot, domain)?;
    if dc.dkim.selectors.contains_key(selector.name()) {
        return Err(RequestError::SelectorExists {
            domain: domain.to_string(),
            selector: selector.to_string(),
        });
    }
    Ok(())
}

/// Returns the selector to be removed.
pub fn check_dkim_removal<'a>(
    snapshot: &'a ConfigSnapshot,
    domain: &Domain,
    selector: &Domain,
) -> Result<&'a Selector, RequestError> {
    let dc = domain_config(snapshot, domain)?;
    dc.dkim
        .selectors
        .get(selector.name())
        .ok_or_else(|| RequestError::UnknownSelector {
            domain: domain.to_string(),
            selector: selector.to_string(),
        })
}
