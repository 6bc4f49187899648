//! Principal resolution from the `Authorization` header.

use super::AppState;
use crate::error::ApiError;
use crate::types::User;
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};

/// Extract the bearer token from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// The authenticated user making the request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;

        let claims = state
            .tokens()
            .verify(token)
            .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;

        // The account may have been deleted after the token was issued
        let user = state
            .db()
            .get_user(&claims.sub)?
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;

        Ok(AuthUser(user))
    }
}
