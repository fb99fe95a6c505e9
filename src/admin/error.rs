//! Errors returned by admin operations.
//!
//! Request errors are caused by the caller and leave no state behind;
//! internal errors carry the step that failed.

use std::error::Error as StdError;

use thiserror::Error;

use crate::address::{AddressError, Domain};
use crate::dynamic::index::DestinationRole;
use crate::dynamic::validation::ConfigIssue;
use crate::store::{issue_list, StoreError};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("{context}: {source}")]
    Internal {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl AdminError {
    pub fn internal(context: impl Into<String>, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Internal {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request(_))
    }
}

impl From<StoreError> for AdminError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Invalid(issues) => Self::Request(RequestError::InvalidConfig(issues)),
            StoreError::Persist(e) => Self::internal("storing configuration", e),
        }
    }
}

impl From<AddressError> for AdminError {
    fn from(e: AddressError) -> Self {
        Self::Request(RequestError::InvalidAddress(e))
    }
}

/// Caller-caused failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RequestError {
    #[error("domain already present: {0}")]
    DomainExists(Domain),

    #[error("domain does not exist: {0}")]
    UnknownDomain(String),

    #[error("account already present: {0}")]
    AccountExists(String),

    #[error("account does not exist: {0}")]
    UnknownAccount(String),

    #[error("account directory {path} already exists, account {account:?} was probably removed but its data not cleaned up")]
    AccountDirExists { account: String, path: String },

    #[error("address already exists: {0}")]
    AddressExists(String),

    #[error("address {0} is an alias")]
    AddressIsAlias(String),

    #[error("address does not exist: {0}")]
    UnknownAddress(String),

    #[error("localpart of {address} cannot contain the catchall separator {separator:?}")]
    CatchallSeparator { address: String, separator: String },

    #[error("address {address} is the {role} address of the domain and cannot be removed")]
    ReservedAddress { address: String, role: DestinationRole },

    #[error("address {address} was not removed, it may be a reserved address")]
    NotRemoved { address: String },

    #[error("address {address} is the login address of credential {fingerprint}, change or remove the credential first")]
    CredentialInUse { address: String, fingerprint: String },

    #[error("domain {domain} is used in login address {address} of credential {fingerprint}, change or remove the credential first")]
    DomainInUse {
        domain: String,
        address: String,
        fingerprint: String,
    },

    #[error("{count} queued message(s) sent from {address} depend on it, drain the queue first")]
    QueuedMessages { address: String, count: usize },

    #[error("address {address} is the last member of alias {alias}, remove the alias first")]
    LastAliasMember { alias: String, address: String },

    #[error("alias already present: {0}")]
    AliasExists(String),

    #[error("alias does not exist: {0}")]
    UnknownAlias(String),

    #[error("alias must have at least one member")]
    EmptyAlias,

    #[error("address {address} is already a member of alias {alias}")]
    AliasMemberExists { alias: String, address: String },

    #[error("address {address} is not a member of alias {alias}")]
    UnknownAliasMember { alias: String, address: String },

    #[error("selector {selector} already present on domain {domain}")]
    SelectorExists { domain: String, selector: String },

    #[error("selector {selector} does not exist on domain {domain}")]
    UnknownSelector { domain: String, selector: String },

    #[error("unsupported dkim algorithm {0:?}, must be rsa-2048 or ed25519")]
    UnsupportedAlgorithm(String),

    #[error("unsupported hash {0:?}, must be sha256 or sha1")]
    UnsupportedHash(String),

    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("invalid configuration: {}", issue_list(.0))]
    InvalidConfig(Vec<ConfigIssue>),

    #[error("{0}")]
    Invalid(String),
}
