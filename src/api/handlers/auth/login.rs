//! Sign-in endpoint.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;

use super::password::verify_password;
use super::state::AuthState;
use super::storage::lookup_login_record;
use super::types::LoginRequest;
use super::utils::normalize_email;
use crate::error::Error;

// Unknown email and wrong password produce this same error so callers
// cannot probe which addresses are registered.
const CREDENTIALS_INCORRECT: &str = "Credentials incorrect";

/// Check the password and return a fresh token pair. The persisted refresh
/// token is overwritten on every successful sign-in.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = super::types::TokenResponse),
        (status = 400, description = "Invalid input", body = String),
        (status = 403, description = "Credentials incorrect", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if email.is_empty() || request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing credentials".to_string()).into_response();
    }

    let record = match lookup_login_record(&pool, &email).await {
        Ok(Some(record)) => record,
        Ok(None) => return Error::Forbidden(CREDENTIALS_INCORRECT).into_response(),
        Err(err) => return err.into_response(),
    };

    if !verify_password(&record.password_hash, &request.password) {
        return Error::Forbidden(CREDENTIALS_INCORRECT).into_response();
    }

    match super::issue_token_pair(&pool, &auth_state, record.user_id, &record.email).await {
        Ok(tokens) => (StatusCode::OK, Json(tokens)).into_response(),
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
    async fn login_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = login(Extension(pool), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn login_empty_password() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = login(
            Extension(pool),
            Extension(auth_state()),
            Some(Json(LoginRequest {
                email: "a@example.com".to_string(),
                password: String::new(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
