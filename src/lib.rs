//! Transactional configuration engine for a mail server's domains,
//! accounts, addresses, aliases and DKIM keys.

pub mod address;
pub mod admin;
pub mod collab;
pub mod config;
pub mod consistency;
pub mod dynamic;
pub mod http;
pub mod keys;
pub mod lifecycle;
pub mod observability;
pub mod store;

pub use admin::{Admin, AdminError, AdminSettings, RequestError};
pub use config::schema::ServerConfig;
pub use http::AdminServer;
pub use lifecycle::Shutdown;
pub use store::ConfigStore;
