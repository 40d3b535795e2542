use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::repo::UserRecord;
use crate::{error::AppError, state::AppState};

/// The admin behind a valid bearer token, re-read from the store.
pub struct AuthUser(pub UserRecord);

/// `Bearer <token>`, scheme matched case-insensitively.
pub(crate) fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;

        let token = bearer_token(header)
            .ok_or_else(|| AppError::Unauthorized("Invalid auth scheme".into()))?;

        let user = state.auth.authenticate(token).await?;
        Ok(AuthUser(user))
    }
}
