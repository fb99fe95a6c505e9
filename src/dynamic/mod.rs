//! Dynamic configuration: the data that administrative operations change.
//!
//! # Data Flow
//! ```text
//! handler builds candidate ConfigSnapshot (cow.rs: copy one record, share the rest)
//!     → validation.rs (invariants, via index.rs lookups)
//!     → persist.rs (round trip check, durable write)
//!     → store publishes the candidate as the new snapshot
//! ```
//!
//! # Design Decisions
//! - Snapshots are values: published ones are never mutated
//! - Derived data (destination index, alias back-references) is recomputed,
//!   never stored, so the persisted document has a single source of truth

pub mod cow;
pub mod index;
pub mod persist;
pub mod schema;
pub mod validation;

pub use cow::CowMap;
pub use index::{AccountDestination, AliasMembership, DestinationIndex, DestinationRole};
pub use persist::{Persistence, PersistError, TomlFile};
pub use schema::{
    AccountConfig, Alias, AliasSettings, Canonicalization, ConfigSnapshot, DkimAlgorithm, DkimHash,
    DomainConfig, Destination, MtaStsConfig, MtaStsMode, ReportingConfig, Selector,
};
pub use validation::{validate_snapshot, ConfigIssue};
