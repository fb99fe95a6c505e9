//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → subscribers (admin API) stop accepting → drain → exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup in main: config, logging, metrics, store, listeners
//! - A transaction in flight on the blocking pool runs to completion; the
//!   store is never left holding a half-applied change

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
