//! HTTP server setup and routing

use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::api;
use crate::state::EndpointState;

/// Build the router: every path is a namespace query, and the root also
/// accepts WebSocket upgrades.
pub fn router(state: Arc<EndpointState>) -> Router {
    Router::new()
        // Root namespace, HOST_INFO and WebSocket upgrade
        .route("/", get(api::get_root))
        // Namespace queries, attributes and SET on any node
        .route("/{*path}", get(api::get_path))
        // CORS
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        // State
        .with_state(state)
}

/// Serve `app` on an already bound listener until the task is aborted
pub async fn run(listener: TcpListener, app: Router) {
    if let Ok(addr) = listener.local_addr() {
        info!(address = %addr, protocol = "HTTP", "Starting OSCQuery server");
    }
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "OSCQuery server failed");
    }
}
