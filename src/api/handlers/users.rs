//! Authenticated self-service endpoints.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

use super::auth::principal::require_auth;
use super::auth::state::AuthState;
use super::auth::storage::{find_user_by_id, update_profile};
use super::auth::types::UserResponse;
use super::auth::utils::{normalize_email, valid_email};
use crate::error::Error;

/// Profile patch. Absent fields leave the column untouched; fields are
/// applied one by one, never by structural merge.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub username: Option<String>,
}

#[utoipa::path(
    get,
    path = "/v1/users/me",
    responses(
        (status = 200, description = "Return the authenticated user", body = UserResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "User is not activated")
    ),
    tag = "users"
)]
pub async fn get_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    match find_user_by_id(&pool, principal.user_id).await {
        Ok(Some(user)) => (
            StatusCode::OK,
            Json(UserResponse {
                id: user.id,
                email: user.email,
                username: user.username,
                role: user.role,
                is_active: user.is_active,
            }),
        )
            .into_response(),
        Ok(None) => Error::NotFound("User doesn't exist").into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/users/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid input", body = String),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 409, description = "Email already in use", body = String)
    ),
    tag = "users"
)]
pub async fn patch_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UpdateProfileRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let request: UpdateProfileRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = match request.email.as_deref() {
        Some(value) => {
            let normalized = normalize_email(value);
            if !valid_email(&normalized) {
                return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
            }
            Some(normalized)
        }
        None => None,
    };

    let username = request
        .username
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    if email.is_none() && username.is_none() {
        return (StatusCode::BAD_REQUEST, "No updates provided".to_string()).into_response();
    }

    match update_profile(&pool, principal.user_id, email.as_deref(), username.as_deref()).await {
        Ok(user) => (
            StatusCode::OK,
            Json(UserResponse {
                id: user.id,
                email: user.email,
                username: user.username,
                role: user.role,
                is_active: user.is_active,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_rejects_unknown_fields() {
        let result: Result<UpdateProfileRequest, _> =
            serde_json::from_str(r#"{"email":"a@example.com","role":"admin"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn patch_accepts_partial_updates() {
        let request: UpdateProfileRequest =
            serde_json::from_str(r#"{"username":"alice"}"#).expect("deserialize");
        assert!(request.email.is_none());
        assert_eq!(request.username.as_deref(), Some("alice"));
    }
}
