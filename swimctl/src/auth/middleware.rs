//! Request authentication: bearer token to [`CurrentUser`].
//!
//! Handlers take [`CurrentUser`] (or [`SessionClaims`]) as an extractor
//! argument; extraction verifies the JWT signature and expiry, then checks
//! the server-side revocation set so logged-out tokens die early.

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};

use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::{revocation, session::SessionClaims, verify_session_token},
    errors::Error,
};

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

impl FromRequestParts<AppState> for SessionClaims {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(Error::Unauthenticated {
            message: Some("Missing bearer token".to_string()),
        })?;

        let claims = verify_session_token(token, &state.config)?;

        if revocation::is_revoked(&state.db, claims.jti).await? {
            tracing::debug!(username = %claims.username, "rejected revoked session token");
            return Err(Error::Unauthenticated {
                message: Some("Session has been logged out".to_string()),
            });
        }

        Ok(claims)
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = SessionClaims::from_request_parts(parts, state).await?;
        Ok(CurrentUser::from(&claims))
    }
}
