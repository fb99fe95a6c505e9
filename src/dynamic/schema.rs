//! Dynamic configuration schema: domains, accounts, aliases, DKIM.
//!
//! Everything here is persisted to the dynamic configuration document and
//! must survive a serialize/parse round trip unchanged.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dynamic::cow::CowMap;

/// An immutable view of the whole dynamic configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSnapshot {
    /// Domain name → domain configuration.
    pub domains: CowMap<DomainConfig>,

    /// Account name → account configuration.
    pub accounts: CowMap<AccountConfig>,
}

impl ConfigSnapshot {
    pub fn domain(&self, name: &str) -> Option<&DomainConfig> {
        self.domains.get(name)
    }

    pub fn account(&self, name: &str) -> Option<&AccountConfig> {
        self.accounts.get(name)
    }

    pub fn with_domain(&self, name: impl Into<String>, domain: DomainConfig) -> Self {
        Self {
            domains: self.domains.with(name, domain),
            accounts: self.accounts.clone(),
        }
    }

    pub fn without_domain(&self, name: &str) -> Self {
        Self {
            domains: self.domains.without(name),
            accounts: self.accounts.clone(),
        }
    }

    pub fn with_account(&self, name: impl Into<String>, account: AccountConfig) -> Self {
        Self {
            domains: self.domains.clone(),
            accounts: self.accounts.with(name, account),
        }
    }

    pub fn without_account(&self, name: &str) -> Self {
        Self {
            domains: self.domains.clone(),
            accounts: self.accounts.without(name),
        }
    }
}

/// Per-domain configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Disabled domains keep their config but do not accept or send mail.
    pub disabled: bool,

    /// Hostname clients are told to connect to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_settings_domain: Option<String>,

    /// Separators after which a local-part is ignored, e.g. `+` in `user+tag`.
    pub localpart_catchall_separators: Vec<String>,

    pub localpart_case_sensitive: bool,

    pub dkim: DkimConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dmarc: Option<ReportingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tlsrpt: Option<ReportingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mta_sts: Option<MtaStsConfig>,

    /// Alias local-part → alias.
    pub aliases: BTreeMap<String, Alias>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DkimConfig {
    /// Selector name → selector.
    pub selectors: BTreeMap<String, Selector>,

    /// Selectors actively used for signing, in order.
    pub sign: Vec<String>,
}

/// A DKIM signing key configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub algorithm: DkimAlgorithm,

    #[serde(default)]
    pub hash: DkimHash,

    #[serde(default)]
    pub canonicalization: Canonicalization,

    /// Headers to sign. Empty means the default header set.
    #[serde(default)]
    pub headers: Vec<String>,

    #[serde(default)]
    pub dont_seal_headers: bool,

    /// Signature lifetime in seconds.
    pub expiration_secs: u64,

    /// Path to the PEM private key, relative to the config directory.
    pub private_key_file: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Canonicalization {
    pub header_relaxed: bool,
    pub body_relaxed: bool,
}

/// Asymmetric key kinds usable for DKIM signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DkimAlgorithm {
    #[serde(rename = "rsa-2048")]
    Rsa2048,
    #[serde(rename = "ed25519")]
    Ed25519,
}

impl DkimAlgorithm {
    /// Short tag used in key file names.
    pub fn file_tag(self) -> &'static str {
        match self {
            Self::Rsa2048 => "rsa2048",
            Self::Ed25519 => "ed25519",
        }
    }
}

impl fmt::Display for DkimAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rsa2048 => "rsa-2048",
            Self::Ed25519 => "ed25519",
        })
    }
}

impl FromStr for DkimAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rsa" | "rsa-2048" | "rsa2048" => Ok(Self::Rsa2048),
            "ed25519" => Ok(Self::Ed25519),
            _ => Err(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DkimHash {
    #[default]
    Sha256,
    Sha1,
}

impl fmt::Display for DkimHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sha256 => "sha256",
            Self::Sha1 => "sha1",
        })
    }
}

impl FromStr for DkimHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "sha1" => Ok(Self::Sha1),
            _ => Err(s.to_string()),
        }
    }
}

/// Where DMARC or TLS aggregate reports for a domain are delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingConfig {
    pub account: String,
    pub localpart: String,
    pub mailbox: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MtaStsConfig {
    pub policy_id: String,
    pub mode: MtaStsMode,
    pub max_age_secs: u64,
    pub mx: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MtaStsMode {
    Enforce,
    Testing,
    None,
}

/// A group address fanning out to member addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Alias {
    /// Member addresses, in the order they were added.
    pub addresses: Vec<String>,

    /// Anyone may post, not only members.
    pub post_public: bool,

    /// Members may see the member list.
    pub list_members: bool,

    /// Messages keep the original From instead of the alias address.
    pub allow_msg_from: bool,
}

/// The updatable flags of an alias.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasSettings {
    pub post_public: bool,
    pub list_members: bool,
    pub allow_msg_from: bool,
}

/// Per-account configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Default domain of the account.
    pub domain: String,

    /// Address (or `@domain` catchall) → delivery rules.
    pub destinations: BTreeMap<String, Destination>,

    /// Additional addresses usable to log in.
    pub from_id_login_addresses: Vec<String>,

    pub rejects_mailbox: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub junk_filter: Option<JunkFilter>,

    pub automatic_junk_flags: AutomaticJunkFlags,

    /// Seconds a sender stays allowed after passing a subject challenge.
    pub subject_pass_period_secs: u64,

    pub no_custom_password: bool,
}

/// Delivery rules for one destination address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Destination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mailbox: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rulesets: Vec<Ruleset>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ruleset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtp_mail_from_regexp: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_domain: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_allow_domain: Option<String>,

    pub mailbox: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JunkFilter {
    pub threshold: f64,
    pub onegrams: bool,
    pub twograms: bool,
    pub max_power: f64,
    pub top_words: u32,
    pub ignore_words: f64,
    pub rare_words: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomaticJunkFlags {
    pub enabled: bool,
    pub junk_mailbox_regexp: String,
    pub neutral_mailbox_regexp: String,
}
