//! Password reset endpoints: request a reset link, then redeem it.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::password::hash_password;
use super::state::AuthState;
use super::storage::{TokenKind, generate_action_link, reset_password as store_reset_password};
use super::types::{PasswordResetLinkResponse, RequestPasswordResetRequest, ResetPasswordRequest};
use super::utils::{normalize_email, valid_email};
use crate::error::Error;

/// Mint a reset token (replacing any live one) and enqueue the email
/// carrying the link. The link is also returned to the caller.
#[utoipa::path(
    post,
    path = "/v1/auth/request-password-reset",
    request_body = RequestPasswordResetRequest,
    responses(
        (status = 200, description = "Reset link generated and email queued", body = PasswordResetLinkResponse),
        (status = 400, description = "Invalid input", body = String),
        (status = 404, description = "User doesn't exist", body = String)
    ),
    tag = "auth"
)]
pub async fn request_password_reset(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RequestPasswordResetRequest>>,
) -> impl IntoResponse {
    let request: RequestPasswordResetRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    match generate_action_link(&pool, &email, TokenKind::ResetPassword, auth_state.config()).await {
        Ok(link) => (StatusCode::OK, Json(PasswordResetLinkResponse { link })).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Redeem the reset token and store the new password hash.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password updated"),
        (status = 400, description = "Invalid input", body = String),
        (status = 404, description = "Invalid or expired token", body = String)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing token".to_string()).into_response();
    }

    if request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing password".to_string()).into_response();
    }

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return Error::Internal("Password reset failed").into_response();
        }
    };

    match store_reset_password(&pool, request.user_id, token, &password_hash).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenIssuer;
    use anyhow::Result;
    use axum::response::IntoResponse;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn auth_state() -> Arc<AuthState> {
        AuthState::new(
            super::super::AuthConfig::new("https://app.tessera.dev".to_string()),
            TokenIssuer::new(
                SecretString::from("access-secret".to_string()),
                SecretString::from("refresh-secret".to_string()),
            ),
        )
    }

    #[tokio::test]
    async fn request_reset_invalid_email() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = request_password_reset(
            Extension(pool),
            Extension(auth_state()),
            Some(Json(RequestPasswordResetRequest {
                email: "nope".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn reset_password_empty_token() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = reset_password(
            Extension(pool),
            Some(Json(ResetPasswordRequest {
                user_id: 1,
                token: String::new(),
                password: "new-password".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn reset_password_empty_password() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = reset_password(
            Extension(pool),
            Some(Json(ResetPasswordRequest {
                user_id: 1,
                token: "token".to_string(),
                password: String::new(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
