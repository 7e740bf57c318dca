//! Route definitions for web server.

use axum::{routing::get, Router};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;

use super::{api, socket};
use crate::controller::Controller;
use crate::protocol::{AGENT_PATH, VIEWER_PATH};

/// API requests carry no bodies worth more than this.
const API_BODY_LIMIT: usize = 64 * 1024;

/// Create the API router.
pub fn create_api_router() -> Router<Arc<Controller>> {
    Router::new()
        // Fleet
        .route("/nodes", get(api::list_nodes))
        .route("/nodes/:id", get(api::get_node))

        // Catalog
        .route("/catalog", get(api::list_catalog))

        // Task history
        .route("/tasks", get(api::list_tasks))
        .route("/tasks/:id", get(api::get_task))
        .layer(RequestBodyLimitLayer::new(API_BODY_LIMIT))
}

/// Create the full app router.
pub fn create_app_router(ctl: Arc<Controller>, static_dir: Option<PathBuf>) -> Router {
    let app = Router::new()
        .nest("/api", create_api_router())
        .route(VIEWER_PATH, get(socket::viewer_socket))
        .route(AGENT_PATH, get(socket::agent_socket))
        .route("/health", get(health_check))
        .with_state(ctl);

    match static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app,
    }
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
