//! Derived lookup tables over a snapshot.
//!
//! # Responsibilities
//! - Map every canonical destination address to the account receiving it
//! - Mark addresses implied by domain settings (postmaster, DMARC and TLS
//!   reporting) with an explicit reserved role
//! - Derive alias membership back-references per account
//!
//! # Design Decisions
//! - Never persisted: rebuilt from the snapshot whenever needed
//! - Building reports every conflict it finds instead of stopping at the first

use std::collections::BTreeMap;
use std::fmt;

use crate::address::{Address, DestinationAddress, Domain, Localpart};
use crate::dynamic::schema::{ConfigSnapshot, DomainConfig};
use crate::dynamic::validation::ConfigIssue;

/// Why an address resolves to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationRole {
    /// Listed in the account's destinations.
    Configured,
    /// Implicit `postmaster@<domain>` of the server's postmaster account.
    Postmaster,
    /// DMARC aggregate report address of a domain.
    DmarcReports,
    /// TLS report address of a domain.
    TlsReports,
}

impl fmt::Display for DestinationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Configured => "configured",
            Self::Postmaster => "postmaster",
            Self::DmarcReports => "dmarc reporting",
            Self::TlsReports => "tls reporting",
        })
    }
}

/// An address resolved to its account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDestination {
    pub account: String,
    /// Canonical local-part; `None` for a catchall.
    pub localpart: Option<String>,
    pub role: DestinationRole,
}

/// An account's membership in an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasMembership {
    pub alias: Address,
    /// The member address (as listed on the alias) that belongs to the account.
    pub subscription_address: String,
}

/// Canonical address → account lookup for one snapshot.
#[derive(Debug, Clone, Default)]
pub struct DestinationIndex {
    by_address: BTreeMap<String, AccountDestination>,
}

/// Folds `localpart` according to the domain: everything from the first
/// catchall separator on is dropped, and case is folded unless the domain
/// is case sensitive.
pub fn canonical_localpart(localpart: &str, domain: &DomainConfig) -> String {
    let mut lp = localpart;
    for sep in &domain.localpart_catchall_separators {
        if sep.is_empty() {
            continue;
        }
        if let Some((head, _)) = lp.split_once(sep.as_str()) {
            lp = head;
        }
    }
    if domain.localpart_case_sensitive {
        lp.to_string()
    } else {
        lp.to_lowercase()
    }
}

/// The index key for `dest`, or `None` if its domain is unknown.
pub fn canonical_key(snapshot: &ConfigSnapshot, dest: &DestinationAddress) -> Option<String> {
    let dc = snapshot.domain(dest.domain().name())?;
    Some(match dest {
        DestinationAddress::Address(a) => {
            format!("{}@{}", canonical_localpart(a.localpart.as_str(), dc), a.domain)
        }
        DestinationAddress::Catchall(d) => format!("@{}", d),
    })
}

impl DestinationIndex {
    /// Builds the index, collecting conflicts and dangling references.
    pub fn build(snapshot: &ConfigSnapshot, postmaster_account: &str) -> (Self, Vec<ConfigIssue>) {
        let mut index = Self::default();
        let mut issues = Vec::new();

        for (account_name, account) in snapshot.accounts.iter() {
            for dest in account.destinations.keys() {
                let parsed = match DestinationAddress::parse(dest) {
                    Ok(p) => p,
                    Err(e) => {
                        issues.push(ConfigIssue::new(
                            format!("accounts.{account_name}.destinations"),
                            format!("invalid destination {dest:?}: {e}"),
                        ));
                        continue;
                    }
                };
                let Some(key) = canonical_key(snapshot, &parsed) else {
                    issues.push(ConfigIssue::new(
                        format!("accounts.{account_name}.destinations"),
                        format!("destination {dest} references unknown domain {}", parsed.domain()),
                    ));
                    continue;
                };
                let localpart = match &parsed {
                    DestinationAddress::Address(_) => key.split_once('@').map(|(lp, _)| lp.to_string()),
                    DestinationAddress::Catchall(_) => None,
                };
                if let Some(existing) = index.by_address.get(&key) {
                    issues.push(ConfigIssue::new(
                        format!("accounts.{account_name}.destinations"),
                        format!(
                            "address {key} configured for account {account_name:?} is already configured for account {:?}",
                            existing.account
                        ),
                    ));
                    continue;
                }
                index.by_address.insert(
                    key,
                    AccountDestination {
                        account: account_name.clone(),
                        localpart,
                        role: DestinationRole::Configured,
                    },
                );
            }
        }

        for (domain_name, dc) in snapshot.domains.iter() {
            let reporting = [
                (&dc.dmarc, DestinationRole::DmarcReports, "dmarc"),
                (&dc.tlsrpt, DestinationRole::TlsReports, "tlsrpt"),
            ];
            for (conf, role, section) in reporting {
                let Some(conf) = conf else { continue };
                let lp = canonical_localpart(&conf.localpart, dc);
                let key = format!("{lp}@{domain_name}");
                match index.by_address.get(&key) {
                    Some(existing) if existing.account != conf.account => {
                        issues.push(ConfigIssue::new(
                            format!("domains.{domain_name}.{section}"),
                            format!(
                                "reporting address {key} for account {:?} is already configured for account {:?}",
                                conf.account, existing.account
                            ),
                        ));
                    }
                    Some(_) => {}
                    None => {
                        index.by_address.insert(
                            key,
                            AccountDestination {
                                account: conf.account.clone(),
                                localpart: Some(lp),
                                role,
                            },
                        );
                    }
                }
            }

            if !postmaster_account.is_empty() {
                let key = format!("postmaster@{domain_name}");
                index.by_address.entry(key).or_insert_with(|| AccountDestination {
                    account: postmaster_account.to_string(),
                    localpart: Some("postmaster".to_string()),
                    role: DestinationRole::Postmaster,
                });
            }
        }

        (index, issues)
    }

    /// Exact lookup by canonical key (`lp@domain` or `@domain`).
    pub fn get(&self, key: &str) -> Option<&AccountDestination> {
        self.by_address.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_address.contains_key(key)
    }

    /// Resolves an address the way delivery would: the canonical address
    /// first, then the domain's catchall. Returns the matched key as well.
    pub fn resolve(&self, snapshot: &ConfigSnapshot, address: &Address) -> Option<(String, &AccountDestination)> {
        let dc = snapshot.domain(address.domain.name())?;
        let key = format!("{}@{}", canonical_localpart(address.localpart.as_str(), dc), address.domain);
        if let Some(ad) = self.by_address.get(&key) {
            return Some((key, ad));
        }
        let catchall = format!("@{}", address.domain);
        self.by_address.get(&catchall).map(|ad| (catchall, ad))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AccountDestination)> {
        self.by_address.iter()
    }
}

/// Alias memberships of `account`, derived from the aliases of all domains.
pub fn alias_memberships(
    snapshot: &ConfigSnapshot,
    index: &DestinationIndex,
    account: &str,
) -> Vec<AliasMembership> {
    let mut out = Vec::new();
    for (domain_name, dc) in snapshot.domains.iter() {
        let Ok(domain) = Domain::parse(domain_name) else { continue };
        for (alias_lp, alias) in &dc.aliases {
            let Ok(localpart) = Localpart::parse(alias_lp) else { continue };
            for member in &alias.addresses {
                let Ok(addr) = Address::parse(member) else { continue };
                let Some(member_dc) = snapshot.domain(addr.domain.name()) else { continue };
                let key = format!(
                    "{}@{}",
                    canonical_localpart(addr.localpart.as_str(), member_dc),
                    addr.domain
                );
                if index.get(&key).is_some_and(|ad| ad.account == account) {
                    out.push(AliasMembership {
                        alias: Address::new(localpart.clone(), domain.clone()),
                        subscription_address: member.clone(),
                    });
                }
            }
        }
    }
    out
}
