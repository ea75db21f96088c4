//! Route definitions for issue CRUD.

use axum::routing::get;
use axum::Router;

use crate::handlers::issues;
use crate::state::AppState;

/// Issue routes mounted at `/issues`.
///
/// ```text
/// GET    /          -> list_issues
/// POST   /          -> create_issue
/// GET    /{id}      -> get_issue
/// PATCH  /{id}      -> update_issue
/// DELETE /{id}      -> delete_issue
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(issues::list_issues).post(issues::create_issue))
        .route(
            "/{id}",
            get(issues::get_issue)
                .patch(issues::update_issue)
                .delete(issues::delete_issue),
        )
}
