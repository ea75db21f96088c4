//! Handlers for issue CRUD.
//!
//! Reads are public (the map is public); mutations require
//! authentication via [`AuthUser`]. Every committed mutation reaches the
//! notify channel through the store's change-bus hook, so these handlers
//! never talk to the WebSocket layer directly.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use kaartwerk_core::issue::{Actor, IssueUpdate, NewIssue};
use kaartwerk_core::types::DbId;

use crate::auth::{AuthUser, Identity};
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

fn actor(identity: &Identity) -> Actor {
    Actor {
        user_id: identity.user_id,
        username: identity.username.clone(),
        display_name: identity.display_name.clone(),
    }
}

/// GET /api/v1/issues
///
/// List all issues.
pub async fn list_issues(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let issues = state.issues.list().await;

    Ok(Json(DataResponse { data: issues }))
}

/// GET /api/v1/issues/{id}
///
/// Fetch a single issue.
pub async fn get_issue(
    State(state): State<AppState>,
    Path(issue_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let issue = state.issues.get(issue_id).await?;

    Ok(Json(DataResponse { data: issue }))
}

/// POST /api/v1/issues
///
/// Create an issue owned by the authenticated user.
pub async fn create_issue(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<NewIssue>,
) -> AppResult<impl IntoResponse> {
    let issue = state.issues.create(input, &actor(&identity)).await;

    tracing::info!(issue_id = issue.id, user_id = identity.user_id, "Issue created");

    Ok((StatusCode::CREATED, Json(DataResponse { data: issue })))
}

/// PATCH /api/v1/issues/{id}
///
/// Apply a partial update to an issue.
pub async fn update_issue(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path(issue_id): Path<DbId>,
    Json(input): Json<IssueUpdate>,
) -> AppResult<impl IntoResponse> {
    let issue = state.issues.update(issue_id, input, &actor(&identity)).await?;

    tracing::info!(issue_id, user_id = identity.user_id, "Issue updated");

    Ok(Json(DataResponse { data: issue }))
}

/// DELETE /api/v1/issues/{id}
///
/// Delete an issue.
pub async fn delete_issue(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path(issue_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    state.issues.remove(issue_id, &actor(&identity)).await?;

    tracing::info!(issue_id, user_id = identity.user_id, "Issue deleted");

    Ok(StatusCode::NO_CONTENT)
}
