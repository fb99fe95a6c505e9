//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Let `RUST_LOG` override the configured log level
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging, fmt layer to stderr
//! - Library code only emits events; installing a subscriber is left to
//!   the binaries

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `default_level` is used when `RUST_LOG`
/// is unset or invalid, e.g. `"info"` or `"mailconf=debug,tower_http=info"`.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
