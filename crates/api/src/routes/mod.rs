pub mod health;
pub mod issues;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws/auth                     coordination WebSocket (locks + presence)
/// /ws/notify                   change-event WebSocket (public)
///
/// /issues                      list, create
/// /issues/{id}                 get, patch, delete
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // WebSocket endpoints.
        .route("/ws/auth", get(ws::auth_channel::auth_ws_handler))
        .route("/ws/notify", get(ws::notify_channel::notify_ws_handler))
        // Issue CRUD.
        .nest("/issues", issues::router())
}

/// Assemble the full application router from shared state.
///
/// Middleware (CORS, tracing, timeouts) is layered on top by the binary
/// entrypoint; integration tests serve this router directly.
pub fn app(state: AppState) -> Router {
    Router::new()
        // Health check at root level (not under /api/v1).
        .merge(health::router())
        // API v1 routes.
        .nest("/api/v1", api_routes())
        .with_state(state)
}
