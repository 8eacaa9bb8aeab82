//! Sign-up endpoint.

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
use super::storage::{SignupOutcome, insert_user_and_verification};
use super::types::RegisterRequest;
use super::utils::{normalize_email, valid_email};
use crate::error::Error;

/// Create an inactive user, enqueue the verification email, and return a
/// token pair. The user, its verification token, and the outbox row are
/// written in one transaction; token issuance happens after commit and is
/// not rolled back by later failures.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created, verification email queued", body = super::types::TokenResponse),
        (status = 400, description = "Invalid input", body = String),
        (status = 409, description = "User with the specified email already exists", body = String)
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    let username = request.username.trim();
    if username.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing username".to_string()).into_response();
    }

    if request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing password".to_string()).into_response();
    }

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return Error::Internal("Registration failed").into_response();
        }
    };

    let role = request.role.unwrap_or_default();

    let outcome =
        insert_user_and_verification(&pool, &email, username, &password_hash, role, auth_state.config())
            .await;

    let user_id = match outcome {
        Ok(SignupOutcome::Created { user_id }) => user_id,
        Ok(SignupOutcome::Conflict) => {
            return Error::Conflict("User already exists").into_response();
        }
        Err(err) => return err.into_response(),
    };

    match super::issue_token_pair(&pool, &auth_state, user_id, &email).await {
        Ok(tokens) => (StatusCode::CREATED, Json(tokens)).into_response(),
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
    async fn register_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = register(Extension(pool), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_invalid_email() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = register(
            Extension(pool),
            Extension(auth_state()),
            Some(Json(RegisterRequest {
                email: "not-an-email".to_string(),
                username: "alice".to_string(),
                password: "hunter2hunter2".to_string(),
                role: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_missing_username() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = register(
            Extension(pool),
            Extension(auth_state()),
            Some(Json(RegisterRequest {
                email: "a@example.com".to_string(),
                username: "  ".to_string(),
                password: "hunter2hunter2".to_string(),
                role: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
