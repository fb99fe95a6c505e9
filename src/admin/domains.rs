//! Domain and DKIM selector operations.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};

use crate::address::{Address, Domain, Localpart};
use crate::admin::accounts::make_account_config;
use crate::admin::{edit_domain, Admin, AdminError, RequestError};
use crate::consistency;
use crate::dynamic::schema::{
    Canonicalization, ConfigSnapshot, Destination, DkimAlgorithm, DkimConfig, DomainConfig, MtaStsConfig,
    MtaStsMode, ReportingConfig, Selector,
};
use crate::keys::{self, KeyIdent};

/// Signature lifetime of selectors created with a new domain.
const DEFAULT_EXPIRATION: Duration = Duration::from_secs(72 * 3600);

/// Initial MTA-STS max age. Operators raise it once the setup works.
const MTA_STS_MAX_AGE: Duration = Duration::from_secs(24 * 3600);

/// A generated key, not yet written.
struct PreparedKey {
    selector: String,
    algorithm: DkimAlgorithm,
    rel_path: String,
    pem: Vec<u8>,
}

/// Parameters of a new DKIM selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DkimAddParams {
    /// `rsa` (2048 bits) or `ed25519`.
    pub algorithm: String,
    /// `sha256` or `sha1`.
    pub hash: String,
    pub header_relaxed: bool,
    pub body_relaxed: bool,
    /// Oversign the signed headers, so they cannot be added to.
    pub seal_headers: bool,
    /// Headers to sign; empty for the default set.
    pub headers: Vec<String>,
    pub lifetime_secs: u64,
}

impl Default for DkimAddParams {
    fn default() -> Self {
        Self {
            algorithm: "ed25519".to_string(),
            hash: "sha256".to_string(),
            header_relaxed: true,
            body_relaxed: true,
            seal_headers: true,
            headers: Vec::new(),
            lifetime_secs: DEFAULT_EXPIRATION.as_secs(),
        }
    }
}

/// Configuration for a new domain with freshly generated keys.
///
/// `keys` are `(selector, config-relative key path)`; the first one signs.
pub fn make_domain_config(
    account: &str,
    keys: &[(String, String)],
    hostname: &Domain,
    domain: &Domain,
    with_mta_sts: bool,
) -> DomainConfig {
    let selectors: BTreeMap<String, Selector> = keys
        .iter()
        .map(|(name, path)| {
            (
                name.clone(),
                Selector {
                    algorithm: DkimAlgorithm::Rsa2048,
                    hash: Default::default(),
                    canonicalization: Canonicalization {
                        header_relaxed: true,
                        body_relaxed: true,
                    },
                    headers: Vec::new(),
                    dont_seal_headers: false,
                    expiration_secs: DEFAULT_EXPIRATION.as_secs(),
                    private_key_file: path.clone(),
                },
            )
        })
        .collect();
    let sign = keys.first().map(|(name, _)| vec![name.clone()]).unwrap_or_default();

    let mta_sts = with_mta_sts.then(|| MtaStsConfig {
        policy_id: Utc::now().format("%Y%m%dT%H%M%S").to_string(),
        mode: MtaStsMode::Enforce,
        max_age_secs: MTA_STS_MAX_AGE.as_secs(),
        mx: vec![hostname.to_string()],
    });

    DomainConfig {
        disabled: false,
        client_settings_domain: Some(format!("mail.{domain}")),
        localpart_catchall_separators: vec!["+".to_string()],
        localpart_case_sensitive: false,
        dkim: DkimConfig { selectors, sign },
        dmarc: Some(ReportingConfig {
            account: account.to_string(),
            localpart: "dmarcreports".to_string(),
            mailbox: "DMARC".to_string(),
        }),
        tlsrpt: Some(ReportingConfig {
            account: account.to_string(),
            localpart: "tlsreports".to_string(),
            mailbox: "TLSRPT".to_string(),
        }),
        mta_sts,
        aliases: BTreeMap::new(),
    }
}

/// Checks how `account` and `localpart` combine for a new domain.
fn check_domain_account(
    snapshot: &ConfigSnapshot,
    account: &str,
    localpart: Option<&Localpart>,
) -> Result<(), RequestError> {
    if account.is_empty() {
        return Err(RequestError::Invalid("account name is empty".to_string()));
    }
    consistency::check_account_name(account)?;
    match (snapshot.accounts.contains_key(account), localpart) {
        (true, Some(_)) => Err(RequestError::Invalid(
            "account already exists, leave localpart empty when using an existing account".to_string(),
        )),
        (false, None) => Err(RequestError::Invalid(
            "account does not yet exist, specify a localpart".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Generates the two RSA keys of a new domain: `<year>a` and `<year>b`.
fn prepare_domain_keys(domain: &Domain) -> Result<Vec<PreparedKey>, AdminError> {
    let now = Local::now();
    let year = now.format("%Y").to_string();
    let timestamp = now.format("%Y%m%dT%H%M%S").to_string();

    ["a", "b"]
        .iter()
        .map(|suffix| {
            let selector = Domain::parse(&format!("{year}{suffix}"))?;
            let pem = keys::generate_key(
                DkimAlgorithm::Rsa2048,
                Some(KeyIdent {
                    selector: &selector,
                    domain,
                }),
            )
            .map_err(|e| AdminError::internal("generating dkim key", e))?;
            Ok(PreparedKey {
                rel_path: keys::key_file_name(&selector, domain, &timestamp, DkimAlgorithm::Rsa2048),
                selector: selector.to_string(),
                algorithm: DkimAlgorithm::Rsa2048,
                pem,
            })
        })
        .collect()
}

impl Admin {
    /// Adds `domain` with two new DKIM keys, reporting addresses for
    /// `account`, and, if the server publishes MTA-STS, a policy.
    ///
    /// If `account` does not exist it is created with address
    /// `localpart@domain`; `localpart` must be `None` for an existing
    /// account, which then gets `postmaster@domain` unless it is the
    /// server's postmaster account.
    pub fn domain_add(
        &self,
        disabled: bool,
        domain: &Domain,
        account: &str,
        localpart: Option<&Localpart>,
    ) -> Result<(), AdminError> {
        let _span = tracing::info_span!("domain_add", %domain, account, disabled).entered();
        self.run("domain_add", || {
            // Fail before generating keys if we already know the answer.
            let current = self.store.snapshot();
            consistency::check_domain_addition(&current, domain)?;
            check_domain_account(&current, account, localpart)?;
            drop(current);

            let prepared = prepare_domain_keys(domain)?;

            let mut tx = self.store.begin_transaction();
            let base = tx.base().clone();
            consistency::check_domain_addition(&base, domain)?;
            check_domain_account(&base, account, localpart)?;

            for key in &prepared {
                tx.write_key_file(&key.rel_path, &key.pem)
                    .map_err(|e| AdminError::internal("writing dkim key", e))?;
                tracing::debug!(selector = %key.selector, algorithm = %key.algorithm, "Wrote dkim key");
            }
            let key_paths: Vec<(String, String)> = prepared
                .iter()
                .map(|k| (k.selector.clone(), k.rel_path.clone()))
                .collect();
            let mut dc = make_domain_config(
                account,
                &key_paths,
                &self.settings.hostname,
                domain,
                self.settings.mta_sts_enabled,
            );
            dc.disabled = disabled;

            let mut next = base.with_domain(domain.name(), dc);
            match (base.account(account), localpart) {
                (None, Some(lp)) => {
                    let addr = Address::new(lp.clone(), domain.clone());
                    next = next.with_account(account, make_account_config(&addr));
                }
                (Some(acc), _) if account != tx.postmaster_account() => {
                    let mut acc = acc.clone();
                    acc.destinations
                        .insert(format!("postmaster@{domain}"), Destination::default());
                    next = next.with_account(account, acc);
                }
                _ => {}
            }

            tx.publish(next)?;
            tracing::info!("Domain added");
            Ok(())
        })
    }

    /// Removes `domain` and retires its DKIM keys no other domain uses.
    /// Retirement happens before the configuration lock is released.
    ///
    /// Accounts are not removed; a domain still used by account
    /// destinations is rejected by snapshot validation.
    pub fn domain_remove(&self, domain: &Domain) -> Result<(), AdminError> {
        let _span = tracing::info_span!("domain_remove", %domain).entered();
        self.run("domain_remove", || {
            let tx = self.store.begin_transaction();
            let credentials = self
                .credentials
                .list_login_credentials(None)
                .map_err(|e| AdminError::internal("listing login credentials", e))?;
            consistency::check_domain_removal(tx.base(), domain, &credentials)?;

            let removed = tx
                .base()
                .domain(domain.name())
                .cloned()
                .ok_or_else(|| RequestError::UnknownDomain(domain.to_string()))?;
            let next = tx.base().without_domain(domain.name());
            let retired = tx.commit(next, |published| {
                let live = keys::live_key_paths(published);
                self.store
                    .keys()
                    .retire_key_files(removed.dkim.selectors.values(), &live)
            })?;
            tracing::info!(retired_keys = retired.len(), "Domain removed");
            Ok(())
        })
    }

    /// Adds a selector to `domain` with a newly generated key.
    ///
    /// The key is generated before the configuration lock is taken.
    pub fn dkim_add(&self, domain: &Domain, selector: &Domain, params: &DkimAddParams) -> Result<(), AdminError> {
        let _span = tracing::info_span!("dkim_add", %domain, %selector, algorithm = %params.algorithm).entered();
        self.run("dkim_add", || {
            let (algorithm, hash) = consistency::parse_dkim_params(&params.algorithm, &params.hash)?;
            consistency::check_dkim_addition(&self.store.snapshot(), domain, selector)?;

            let pem = keys::generate_key(algorithm, Some(KeyIdent { selector, domain }))
                .map_err(|e| AdminError::internal("generating dkim key", e))?;

            let mut tx = self.store.begin_transaction();
            consistency::check_dkim_addition(tx.base(), domain, selector)?;

            let rel_path = keys::key_file_name(selector, domain, &keys::file_timestamp(), algorithm);
            tx.write_key_file(&rel_path, &pem)
                .map_err(|e| AdminError::internal("writing dkim key", e))?;

            let sel = Selector {
                algorithm,
                hash,
                canonicalization: Canonicalization {
                    header_relaxed: params.header_relaxed,
                    body_relaxed: params.body_relaxed,
                },
                headers: params.headers.clone(),
                dont_seal_headers: !params.seal_headers,
                expiration_secs: params.lifetime_secs,
                private_key_file: rel_path,
            };
            let next = edit_domain(tx.base(), domain.name(), |dc| {
                dc.dkim.selectors.insert(selector.to_string(), sel);
                Ok(())
            })?;
            tx.publish(next)?;
            tracing::info!("Dkim key added");
            Ok(())
        })
    }

    /// Removes a selector from `domain`, dropping it from the signing list
    /// and retiring its key unless another selector still uses it.
    pub fn dkim_remove(&self, domain: &Domain, selector: &Domain) -> Result<(), AdminError> {
        let _span = tracing::info_span!("dkim_remove", %domain, %selector).entered();
        self.run("dkim_remove", || {
            let tx = self.store.begin_transaction();
            let removed = consistency::check_dkim_removal(tx.base(), domain, selector)?.clone();

            let next = edit_domain(tx.base(), domain.name(), |dc| {
                dc.dkim.selectors.remove(selector.name());
                dc.dkim.sign.retain(|s| s != selector.name());
                Ok(())
            })?;
            let retired = tx.commit(next, |published| {
                let live = keys::live_key_paths(published);
                self.store.keys().retire_key_files([&removed], &live)
            })?;
            tracing::info!(retired_keys = retired.len(), "Dkim key removed");
            Ok(())
        })
    }
}
