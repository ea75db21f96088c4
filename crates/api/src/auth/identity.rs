//! Verified caller identity, extracted from a bearer token.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use kaartwerk_core::types::DbId;

use crate::auth::jwt::{validate_token, Claims};
use crate::error::AppError;
use crate::state::AppState;

/// A verified identity attached to a request or websocket session.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: DbId,
    pub username: String,
    /// Display name, falling back to the username when the account
    /// has none.
    pub display_name: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        let display_name = claims.name.unwrap_or_else(|| claims.username.clone());
        Self {
            user_id: claims.sub,
            username: claims.username,
            display_name,
        }
    }
}

/// Extractor that authenticates a request via the `Authorization: Bearer`
/// header. Handlers that take an `AuthUser` argument reject
/// unauthenticated requests with `401 Unauthorized`.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Missing authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::unauthorized("Invalid authorization header format"))?;

        let claims = validate_token(token, &state.config.jwt)
            .map_err(|_| AppError::unauthorized("Invalid or expired token"))?;

        Ok(AuthUser(claims.into()))
    }
}
