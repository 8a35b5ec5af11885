//! Owner authentication for the `/api/galleries` routes.

use crate::{AppState, errors::AppError};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use uuid::Uuid;

/// The authenticated gallery owner, from `Authorization: Bearer {token}`.
///
/// Rejects with 401 `unauthorized` when the header is missing, malformed or
/// carries a token this server did not sign.
#[derive(Debug, Clone, Copy)]
pub struct Owner(pub Uuid);

impl FromRequestParts<AppState> for Owner {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| AppError::unauthorized("unauthorized"))?;

        match state.signer.verify_owner_token(token) {
            Some(user_id) => Ok(Owner(user_id)),
            None => {
                tracing::warn!("rejected owner token");
                Err(AppError::unauthorized("unauthorized"))
            }
        }
    }
}
