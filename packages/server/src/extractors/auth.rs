use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use crate::utils::jwt;

/// Authenticated producer extracted from the `Authorization: Bearer <token>` header.
///
/// Add this as a handler parameter to require authentication.
/// Ownership checks happen via `require_owner()` in the handler body.
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
}

impl AuthUser {
    /// Returns `Ok(())` if the user is `owner_id`, `Err(PermissionDenied)` otherwise.
    pub fn require_owner(&self, owner_id: Uuid) -> Result<(), AppError> {
        if self.user_id == owner_id {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::TokenMissing)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AppError::TokenInvalid)?;

        let claims = jwt::verify(&state.config.auth.jwt_secret, token)
            .map_err(|_| AppError::TokenInvalid)?;

        Ok(AuthUser {
            user_id: claims.uid,
            username: claims.sub,
        })
    }
}
