//! Database helpers for users and single-use tokens.
//!
//! This module owns the `users` and `single_use_tokens` tables. Reads hand
//! out [`UserProfile`] values that exclude the password hash; the hash only
//! surfaces through [`LoginRecord`], which stays inside the auth handlers.
//! Multi-row groups (signup, token regeneration + outbox enqueue, redemption
//! + side effect) run inside a single transaction.

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::Instrument;

use super::state::AuthConfig;
use super::types::UserRole;
use super::utils::{
    build_action_link, generate_single_use_secret, hash_single_use_secret, is_unique_violation,
};
use crate::error::Error;

/// Purpose of a single-use token. At most one live token exists per
/// `(user, kind)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    EmailVerification,
    ResetPassword,
}

impl TokenKind {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification",
            Self::ResetPassword => "reset_password",
        }
    }

    /// Outbox template delivering the link for this purpose.
    pub(super) fn template(self) -> &'static str {
        match self {
            Self::EmailVerification => "verify_email",
            Self::ResetPassword => "reset_password",
        }
    }

    fn ttl_seconds(self, config: &AuthConfig) -> i64 {
        match self {
            Self::EmailVerification => config.verification_ttl_seconds(),
            Self::ResetPassword => config.reset_ttl_seconds(),
        }
    }
}

/// Outcome when attempting to create a new user + verification record.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created { user_id: i64 },
    Conflict,
}

/// Minimal fields needed to check a password login. Never leaves the auth
/// handlers.
pub(super) struct LoginRecord {
    pub(super) user_id: i64,
    pub(super) email: String,
    pub(super) password_hash: String,
}

/// Sanitized user representation handed outside this module.
#[derive(Debug, Clone)]
pub(crate) struct UserProfile {
    pub(crate) id: i64,
    pub(crate) email: String,
    pub(crate) username: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
}

fn profile_from_row(row: &sqlx::postgres::PgRow) -> UserProfile {
    let role: String = row.get("role");
    UserProfile {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        role: UserRole::parse(&role).unwrap_or_default(),
        is_active: row.get("is_active"),
    }
}

/// Look up login data by email.
pub(super) async fn lookup_login_record(
    pool: &PgPool,
    email: &str,
) -> Result<Option<LoginRecord>, Error> {
    let query = "SELECT id, email, password_hash FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await?;

    Ok(row.map(|row| LoginRecord {
        user_id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
    }))
}

pub(crate) async fn find_user_by_id(
    pool: &PgPool,
    user_id: i64,
) -> Result<Option<UserProfile>, Error> {
    let query = "SELECT id, email, username, role, is_active FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await?;
    Ok(row.as_ref().map(profile_from_row))
}

async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserProfile>, Error> {
    let query = "SELECT id, email, username, role, is_active FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await?;
    Ok(row.as_ref().map(profile_from_row))
}

/// Create the user (inactive), its verification token, and the outbox row
/// that will deliver the activation link, all in one transaction.
pub(super) async fn insert_user_and_verification(
    pool: &PgPool,
    email: &str,
    username: &str,
    password_hash: &str,
    role: UserRole,
    config: &AuthConfig,
) -> Result<SignupOutcome, Error> {
    let mut tx = pool.begin().await?;

    let query = r"
        INSERT INTO users (email, username, password_hash, role)
        VALUES ($1, $2, $3, $4)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(username)
        .bind(password_hash)
        .bind(role.as_str())
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user_id: i64 = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(SignupOutcome::Conflict);
            }
            return Err(err.into());
        }
    };

    insert_action_token_and_email(&mut tx, user_id, email, username, TokenKind::EmailVerification, config)
        .await?;

    tx.commit().await?;

    Ok(SignupOutcome::Created { user_id })
}

/// Replace any live token of this kind for the user and enqueue the email
/// carrying the link. Returns the link with the raw secret embedded.
async fn insert_action_token_and_email(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    email: &str,
    username: &str,
    kind: TokenKind,
    config: &AuthConfig,
) -> Result<String, Error> {
    let secret =
        generate_single_use_secret().map_err(|_| Error::Internal("Token generation failed"))?;
    let token_hash = hash_single_use_secret(&secret);

    // The upsert replaces the previous live token atomically, so the old
    // secret stops being redeemable the moment a new one is minted.
    let query = r"
        INSERT INTO single_use_tokens (user_id, kind, token_hash, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
        ON CONFLICT (user_id, kind) DO UPDATE
        SET token_hash = EXCLUDED.token_hash,
            expires_at = EXCLUDED.expires_at,
            created_at = NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(kind.as_str())
        .bind(&token_hash)
        .bind(kind.ttl_seconds(config))
        .execute(&mut **tx)
        .instrument(span)
        .await?;

    let link = build_action_link(config.client_base_url(), kind, &secret, user_id);
    let payload = json!({
        "email": email,
        "username": username,
        "link": link,
    });
    let payload_text =
        serde_json::to_string(&payload).map_err(|_| Error::Internal("Email payload failed"))?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(kind.template())
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(span)
        .await?;

    Ok(link)
}

/// Mint a fresh verification or reset token for the user and enqueue the
/// email. Fails with `NotFound` for unknown emails.
pub(super) async fn generate_action_link(
    pool: &PgPool,
    email: &str,
    kind: TokenKind,
    config: &AuthConfig,
) -> Result<String, Error> {
    let user = find_user_by_email(pool, email)
        .await?
        .ok_or(Error::NotFound("User doesn't exist"))?;

    let mut tx = pool.begin().await?;
    let link =
        insert_action_token_and_email(&mut tx, user.id, &user.email, &user.username, kind, config)
            .await?;
    tx.commit().await?;

    Ok(link)
}

/// Consume a single-use token: one conditional delete keyed by
/// `(user, kind, hash)` so at most one of two racing redemptions succeeds.
/// The expiry check runs on the returned deadline; an expired row is
/// consumed by the same statement and can never be redeemed later.
async fn consume_action_token(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    kind: TokenKind,
    secret: &str,
) -> Result<(), Error> {
    let token_hash = hash_single_use_secret(secret);

    let query = r"
        DELETE FROM single_use_tokens
        WHERE user_id = $1 AND kind = $2 AND token_hash = $3
        RETURNING expires_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(kind.as_str())
        .bind(&token_hash)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await?;

    let Some(row) = row else {
        return Err(Error::NotFound("Invalid or expired token"));
    };

    let expires_at: DateTime<Utc> = row.get("expires_at");
    if expires_at <= Utc::now() {
        return Err(Error::Expired);
    }

    Ok(())
}

/// Redeem a verification token and activate the user atomically.
pub(super) async fn verify_email_token(
    pool: &PgPool,
    email: &str,
    secret: &str,
) -> Result<(), Error> {
    let user = find_user_by_email(pool, email)
        .await?
        .ok_or(Error::NotFound("User doesn't exist"))?;

    let mut tx = pool.begin().await?;
    consume_action_token(&mut tx, user.id, TokenKind::EmailVerification, secret).await?;

    let query = "UPDATE users SET is_active = TRUE, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user.id)
        .execute(&mut *tx)
        .instrument(span)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Redeem a reset token and store the new password hash atomically.
pub(super) async fn reset_password(
    pool: &PgPool,
    user_id: i64,
    secret: &str,
    new_password_hash: &str,
) -> Result<(), Error> {
    let mut tx = pool.begin().await?;
    consume_action_token(&mut tx, user_id, TokenKind::ResetPassword, secret).await?;

    let query = "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(new_password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Persist the latest refresh token, overwriting any prior value.
pub(super) async fn set_refresh_token(
    pool: &PgPool,
    user_id: i64,
    refresh_token: &str,
) -> Result<(), Error> {
    let query = "UPDATE users SET refresh_token = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(refresh_token)
        .execute(pool)
        .instrument(span)
        .await?;
    Ok(())
}

/// Apply a profile patch field-by-field. `None` leaves a column untouched.
pub(crate) async fn update_profile(
    pool: &PgPool,
    user_id: i64,
    email: Option<&str>,
    username: Option<&str>,
) -> Result<UserProfile, Error> {
    let query = r"
        UPDATE users
        SET email = COALESCE($2, email),
            username = COALESCE($3, username),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, email, username, role, is_active
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(email)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                Error::Conflict("Email already in use")
            } else {
                err.into()
            }
        })?;

    row.as_ref()
        .map(profile_from_row)
        .ok_or(Error::NotFound("User doesn't exist"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_storage_form() {
        assert_eq!(TokenKind::EmailVerification.as_str(), "email_verification");
        assert_eq!(TokenKind::ResetPassword.as_str(), "reset_password");
    }

    #[test]
    fn templates_match_purpose() {
        assert_eq!(TokenKind::EmailVerification.template(), "verify_email");
        assert_eq!(TokenKind::ResetPassword.template(), "reset_password");
    }

    #[test]
    fn ttl_follows_kind() {
        let config = AuthConfig::new("https://app.tessera.dev".to_string());
        assert_eq!(
            TokenKind::EmailVerification.ttl_seconds(&config),
            24 * 60 * 60
        );
        assert_eq!(TokenKind::ResetPassword.ttl_seconds(&config), 15 * 60);
    }
}
