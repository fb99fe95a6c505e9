//! Snapshot invariant validation.
//!
//! # Responsibilities
//! - Check referential integrity: every address resolves to a known domain,
//!   reporting accounts exist, signing selectors exist
//! - Check global destination uniqueness after canonicalization
//! - Check alias invariants (non-empty, resolvable, not shadowing a destination)
//! - Check that referenced key files are present
//!
//! # Design Decisions
//! - Returns all issues, not just the first
//! - Pure except for the optional key-file presence check

use std::collections::BTreeSet;
use std::fmt;

use crate::address::{Address, Domain, Localpart};
use crate::dynamic::index::{canonical_localpart, DestinationIndex};
use crate::dynamic::schema::ConfigSnapshot;
use crate::keys::KeyMaterialManager;

/// A single invariant violation, located by a dotted config path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub path: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validates `snapshot`, returning its destination index when it is sound.
///
/// `keys`, when given, is used to confirm that every selector's private key
/// file exists and holds a private key.
pub fn validate_snapshot(
    snapshot: &ConfigSnapshot,
    postmaster_account: &str,
    keys: Option<&KeyMaterialManager>,
) -> Result<DestinationIndex, Vec<ConfigIssue>> {
    let (index, mut issues) = DestinationIndex::build(snapshot, postmaster_account);

    for (name, dc) in snapshot.domains.iter() {
        if Domain::parse(name).map(|d| d.name() != name).unwrap_or(true) {
            issues.push(ConfigIssue::new(format!("domains.{name}"), "invalid or non-normalized domain name"));
        }

        for (section, conf) in [("dmarc", &dc.dmarc), ("tlsrpt", &dc.tlsrpt)] {
            let Some(conf) = conf else { continue };
            if !snapshot.accounts.contains_key(&conf.account) {
                issues.push(ConfigIssue::new(
                    format!("domains.{name}.{section}"),
                    format!("unknown account {:?}", conf.account),
                ));
            }
            if Localpart::parse(&conf.localpart).is_err() {
                issues.push(ConfigIssue::new(
                    format!("domains.{name}.{section}"),
                    format!("invalid localpart {:?}", conf.localpart),
                ));
            }
        }

        let mut signing = BTreeSet::new();
        for sel in &dc.dkim.sign {
            if !dc.dkim.selectors.contains_key(sel) {
                issues.push(ConfigIssue::new(
                    format!("domains.{name}.dkim.sign"),
                    format!("unknown selector {sel:?}"),
                ));
            }
            if !signing.insert(sel) {
                issues.push(ConfigIssue::new(
                    format!("domains.{name}.dkim.sign"),
                    format!("selector {sel:?} listed twice"),
                ));
            }
        }
        for (sel_name, sel) in &dc.dkim.selectors {
            let path = format!("domains.{name}.dkim.selectors.{sel_name}");
            if Domain::parse(sel_name).is_err() {
                issues.push(ConfigIssue::new(path.clone(), "invalid selector name"));
            }
            if sel.private_key_file.is_empty() {
                issues.push(ConfigIssue::new(path, "missing private key file"));
                continue;
            }
            if let Some(keys) = keys {
                if let Err(e) = keys.check_key_file(&sel.private_key_file, sel.algorithm) {
                    issues.push(ConfigIssue::new(path, e.to_string()));
                }
            }
        }

        for (alias_lp, alias) in &dc.aliases {
            let path = format!("domains.{name}.aliases.{alias_lp}");
            if Localpart::parse(alias_lp).is_err() {
                issues.push(ConfigIssue::new(path.clone(), "invalid alias localpart"));
            } else if canonical_localpart(alias_lp, dc) != *alias_lp {
                issues.push(ConfigIssue::new(path.clone(), "alias localpart must be canonical"));
            }
            let alias_key = format!("{alias_lp}@{name}");
            if index.contains(&alias_key) {
                issues.push(ConfigIssue::new(
                    path.clone(),
                    format!("alias address {alias_key} is also configured as an account destination"),
                ));
            }
            if alias.addresses.is_empty() {
                issues.push(ConfigIssue::new(path.clone(), "alias must have at least one member"));
            }
            let mut seen = BTreeSet::new();
            for member in &alias.addresses {
                let addr = match Address::parse(member) {
                    Ok(a) => a,
                    Err(e) => {
                        issues.push(ConfigIssue::new(path.clone(), format!("invalid member {member:?}: {e}")));
                        continue;
                    }
                };
                let Some(member_dc) = snapshot.domain(addr.domain.name()) else {
                    issues.push(ConfigIssue::new(
                        path.clone(),
                        format!("member {member} references unknown domain"),
                    ));
                    continue;
                };
                let key = format!(
                    "{}@{}",
                    canonical_localpart(addr.localpart.as_str(), member_dc),
                    addr.domain
                );
                if key == alias_key {
                    issues.push(ConfigIssue::new(path.clone(), "alias cannot be a member of itself"));
                } else if !index.contains(&key) {
                    issues.push(ConfigIssue::new(
                        path.clone(),
                        format!("member {member} is not an account address"),
                    ));
                }
                if !seen.insert(key) {
                    issues.push(ConfigIssue::new(path.clone(), format!("duplicate member {member}")));
                }
            }
        }
    }

    for (name, acc) in snapshot.accounts.iter() {
        if !acc.domain.is_empty() && !snapshot.domains.contains_key(&acc.domain) {
            issues.push(ConfigIssue::new(
                format!("accounts.{name}.domain"),
                format!("unknown domain {:?}", acc.domain),
            ));
        }
        for login in &acc.from_id_login_addresses {
            let path = format!("accounts.{name}.from_id_login_addresses");
            let addr = match Address::parse(login) {
                Ok(a) => a,
                Err(e) => {
                    issues.push(ConfigIssue::new(path, format!("invalid address {login:?}: {e}")));
                    continue;
                }
            };
            match index.resolve(snapshot, &addr) {
                Some((_, ad)) if ad.account == *name => {}
                _ => issues.push(ConfigIssue::new(
                    path,
                    format!("login address {login} does not belong to the account"),
                )),
            }
        }
    }

    if issues.is_empty() {
        Ok(index)
    } else {
        Err(issues)
    }
}
