//! Parsed mail identifiers: domains, local-parts and addresses.
//!
//! # Responsibilities
//! - Validate domain names and local-parts before they reach the config
//! - Provide the `@domain` catchall form alongside plain addresses
//!
//! # Design Decisions
//! - Domains are stored lowercased; only ASCII names are accepted
//! - Local-parts keep their case; folding is a per-domain canonicalization
//!   decision (see `dynamic::index::canonical_localpart`)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;
const MAX_LOCALPART_LEN: usize = 64;

/// Errors produced while parsing identifiers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty domain")]
    EmptyDomain,

    #[error("invalid domain {0:?}")]
    InvalidDomain(String),

    #[error("empty localpart")]
    EmptyLocalpart,

    #[error("invalid localpart {0:?}")]
    InvalidLocalpart(String),

    #[error("missing @ in address {0:?}")]
    MissingAt(String),
}

/// A DNS domain name, lowercased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let name = s.strip_suffix('.').unwrap_or(s).to_ascii_lowercase();
        if name.is_empty() {
            return Err(AddressError::EmptyDomain);
        }
        if name.len() > MAX_DOMAIN_LEN {
            return Err(AddressError::InvalidDomain(s.to_string()));
        }
        for label in name.split('.') {
            let valid = !label.is_empty()
                && label.len() <= MAX_LABEL_LEN
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
            if !valid {
                return Err(AddressError::InvalidDomain(s.to_string()));
            }
        }
        Ok(Self(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Domain {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Domain {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Domain> for String {
    fn from(d: Domain) -> Self {
        d.0
    }
}

/// The part of an address before the `@`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Localpart(String);

impl Localpart {
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        if s.is_empty() {
            return Err(AddressError::EmptyLocalpart);
        }
        let valid = s.len() <= MAX_LOCALPART_LEN
            && !s.starts_with('.')
            && !s.ends_with('.')
            && !s.contains("..")
            && s
                .chars()
                .all(|c| !c.is_whitespace() && !c.is_control() && !"@<>()[]\\,;:\"".contains(c));
        if !valid {
            return Err(AddressError::InvalidLocalpart(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Localpart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Localpart {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Localpart {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Localpart> for String {
    fn from(lp: Localpart) -> Self {
        lp.0
    }
}

/// A full `localpart@domain` address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub localpart: Localpart,
    pub domain: Domain,
}

impl Address {
    pub fn new(localpart: Localpart, domain: Domain) -> Self {
        Self { localpart, domain }
    }

    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let (lp, dom) = s
            .rsplit_once('@')
            .ok_or_else(|| AddressError::MissingAt(s.to_string()))?;
        Ok(Self {
            localpart: Localpart::parse(lp)?,
            domain: Domain::parse(dom)?,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.localpart, self.domain)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A destination as configured on an account: a plain address or the
/// catchall `@domain`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DestinationAddress {
    Address(Address),
    Catchall(Domain),
}

impl DestinationAddress {
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        match s.strip_prefix('@') {
            Some(dom) => Ok(Self::Catchall(Domain::parse(dom)?)),
            None => Ok(Self::Address(Address::parse(s)?)),
        }
    }

    pub fn domain(&self) -> &Domain {
        match self {
            Self::Address(a) => &a.domain,
            Self::Catchall(d) => d,
        }
    }

    pub fn is_catchall(&self) -> bool {
        matches!(self, Self::Catchall(_))
    }
}

impl fmt::Display for DestinationAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(a) => a.fmt(f),
            Self::Catchall(d) => write!(f, "@{}", d),
        }
    }
}

impl FromStr for DestinationAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
