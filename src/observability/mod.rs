//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! admin operations, store, key manager produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stderr / log aggregation
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Every admin operation runs in an `info` span named after it, carrying
//!   its arguments, so store and key manager events inherit them
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
