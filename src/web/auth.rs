//! API-token authentication middleware.
//!
//! Mutating routes require an `X-Api-Token` header resolving to a known
//! user; the resolved identity is injected for handlers to read.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::error::ApiError;
use super::AppState;

/// Header carrying the caller's API token.
pub const API_TOKEN_HEADER: &str = "X-Api-Token";

/// The authenticated principal, resolved by [`require_token`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}

/// Reject the request unless a valid API token is supplied.
pub async fn require_token(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(API_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let user = match state.store.get_user_by_api_key(token) {
        Ok(user) => user,
        Err(crate::db::DbError::NotFound) => return Err(ApiError::Unauthorized),
        Err(err) => return Err(err.into()),
    };

    req.extensions_mut().insert(AuthUser {
        id: user.id,
        username: user.username,
    });
    Ok(next.run(req).await)
}
