//! Admin HTTP API.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout, body limit)
//!     → auth.rs (bearer token)
//!     → handlers.rs (parse JSON and path arguments)
//!     → blocking pool: Admin::<operation>
//!     → 204 | JSON body | 400/500 with {"error": ...}
//! ```

pub mod auth;
pub mod handlers;
pub mod server;

pub use server::{admin_router, AdminServer, ApiState};
