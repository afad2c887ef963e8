use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{errors::AppError, state::AppState};

/// Header carrying the session token.
pub const TOKEN_HEADER: &str = "X-Token";

/// Raw session token from the request, if any.
pub fn token_from_parts(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Authenticated user resolved from the `X-Token` header.
///
/// Add this as a handler parameter to require a valid session; requests
/// without one are answered with 401 before the handler runs.
pub struct AuthUser {
    pub user_id: Uuid,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts).ok_or_else(AppError::unauthorized)?;
        let user_id = state
            .sessions
            .validate(token)
            .await?
            .ok_or_else(AppError::unauthorized)?;
        Ok(AuthUser { user_id })
    }
}

/// Session token that may be absent; used by routes that also serve public content.
pub struct MaybeToken(pub Option<String>);

impl<S> FromRequestParts<S> for MaybeToken
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeToken(token_from_parts(parts).map(str::to_string)))
    }
}
