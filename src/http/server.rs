//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all admin handlers
//! - Wire up middleware (request ID, tracing, timeout, body limit, auth)
//! - Serve until the shutdown future completes

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    map_response_body::MapResponseBodyLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::Admin;
use crate::config::schema::AdminConfig;
use crate::http::auth::admin_auth_middleware;
use crate::http::handlers;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct ApiState {
    pub admin: Arc<Admin>,
    pub api_key: Arc<str>,
}

/// Builds the admin router with all middleware layers.
#[allow(deprecated)]
pub fn admin_router(admin: Arc<Admin>, config: &AdminConfig) -> Router {
    let state = ApiState {
        admin,
        api_key: Arc::from(config.api_key.as_str()),
    };

    Router::new()
        .route("/admin/status", get(handlers::get_status))
        .route("/admin/config", get(handlers::get_config))
        .route("/admin/domains", get(handlers::list_domains).post(handlers::add_domain))
        .route("/admin/domains/{domain}", delete(handlers::remove_domain))
        .route("/admin/domains/{domain}/dkim", post(handlers::add_dkim))
        .route("/admin/domains/{domain}/dkim/{selector}", delete(handlers::remove_dkim))
        .route("/admin/accounts", get(handlers::list_accounts).post(handlers::add_account))
        .route(
            "/admin/accounts/{account}",
            get(handlers::get_account).delete(handlers::remove_account),
        )
        .route("/admin/addresses", post(handlers::add_address))
        .route("/admin/addresses/{address}", delete(handlers::remove_address))
        .route("/admin/aliases", post(handlers::add_alias))
        .route(
            "/admin/aliases/{address}",
            get(handlers::get_alias)
                .put(handlers::update_alias)
                .delete(handlers::remove_alias),
        )
        .route(
            "/admin/aliases/{address}/members",
            post(handlers::add_alias_members).delete(handlers::remove_alias_members),
        )
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
                .layer(MapResponseBodyLayer::new(axum::body::Body::new))
                .layer(RequestBodyLimitLayer::new(config.max_body_size)),
        )
}

/// HTTP server for the admin API.
pub struct AdminServer {
    router: Router,
}

impl AdminServer {
    pub fn new(admin: Arc<Admin>, config: &AdminConfig) -> Self {
        Self {
            router: admin_router(admin, config),
        }
    }

    /// Run the server until `shutdown` completes, then finish in-flight
    /// requests.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Admin API listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Admin API stopped");
        Ok(())
    }
}
