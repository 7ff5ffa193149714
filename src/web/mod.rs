//! Web server module.

mod auth;
mod envelope;
mod error;
mod handlers;

pub use auth::*;
pub use envelope::*;
pub use error::*;
pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::Store;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
}

/// Build the router with all routes.
///
/// Reads are public; every mutating route sits behind the API-token
/// middleware.
pub(crate) fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/components", get(handlers::list_components))
        .route("/components/{id}", get(handlers::get_component))
        .route("/incidents", get(handlers::list_incidents))
        .route("/incidents/{id}", get(handlers::get_incident))
        .route("/metrics", get(handlers::list_metrics))
        .route("/metrics/{id}", get(handlers::get_metric))
        .route("/metrics/{id}/points", get(handlers::list_metric_points))
        .route("/metrics/{id}/points/{point_id}", get(handlers::get_metric_point));

    let mutating = Router::new()
        .route("/components", post(handlers::create_component))
        .route(
            "/components/{id}",
            put(handlers::update_component).delete(handlers::delete_component),
        )
        .route("/incidents", post(handlers::create_incident))
        .route(
            "/incidents/{id}",
            put(handlers::update_incident).delete(handlers::delete_incident),
        )
        .route("/metrics", post(handlers::create_metric))
        .route(
            "/metrics/{id}",
            put(handlers::update_metric).delete(handlers::delete_metric),
        )
        .route("/metrics/{id}/points", post(handlers::create_metric_point))
        .route(
            "/metrics/{id}/points/{point_id}",
            put(handlers::update_metric_point).delete(handlers::delete_metric_point),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_token));

    public
        .merge(mutating)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
        .with_state(state)
}

/// Web server for Statuswire.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, store: Arc<Store>) -> Self {
        Self {
            state: AppState { config, store },
        }
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = router(self.state.clone());

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
