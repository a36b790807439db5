//! Server-side session revocation set.
//!
//! Tokens are stateless, so logout cannot destroy them; instead the token id
//! is written here and the middleware refuses any token whose id is present.
//! Rows are only needed until the token would have expired on its own, so
//! each revocation opportunistically prunes the lapsed ones.

use crate::db::errors::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Revoke a token id until its natural expiry.
#[instrument(skip(pool), err)]
pub async fn revoke(pool: &PgPool, jti: Uuid, expires_at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO revoked_tokens (jti, expires_at)
        VALUES ($1, $2)
        ON CONFLICT (jti) DO NOTHING
        "#,
    )
    .bind(jti)
    .bind(expires_at)
    .execute(pool)
    .await?;

    // Lapsed entries can never match a live token again
    sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < NOW()")
        .execute(pool)
        .await?;

    Ok(())
}

/// Whether a token id has been revoked.
pub async fn is_revoked(pool: &PgPool, jti: Uuid) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT jti FROM revoked_tokens WHERE jti = $1")
        .bind(jti)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}
