//! Authenticated principal extraction and the role guard.
//!
//! Flow Overview: read the `Authorization: Bearer` header, verify the access
//! token, resolve the user, and reject callers that have not completed email
//! verification. Routes declare their required global roles as an explicit
//! slice checked by [`role_allowed`]; per-workspace roles are resolved in the
//! workspace handlers, not here.

use axum::http::HeaderMap;
use sqlx::PgPool;

use super::state::AuthState;
use super::storage;
use super::types::UserRole;
use crate::error::Error;
use crate::token;

/// Authenticated user context derived from the bearer token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: i64,
    pub email: String,
    pub username: String,
    pub role: UserRole,
}

/// Pure policy check: an empty required set means the route is unrestricted;
/// otherwise the caller's role must be in the set. No caller, no access.
#[must_use]
pub fn role_allowed(required: &[UserRole], caller: Option<UserRole>) -> bool {
    if required.is_empty() {
        return true;
    }
    caller.is_some_and(|role| required.contains(&role))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Resolve the bearer token into a principal.
///
/// # Errors
/// `Unauthorized` for missing/invalid/expired tokens or unknown users,
/// `Forbidden` for users that have not activated their account.
pub async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<Principal, Error> {
    let Some(bearer) = bearer_token(headers) else {
        return Err(Error::Unauthorized("Missing bearer token"));
    };

    let claims = state.issuer().verify_access(bearer).map_err(|err| match err {
        token::Error::Expired => Error::Unauthorized("Token expired"),
        _ => Error::Unauthorized("Invalid bearer token"),
    })?;

    let user = storage::find_user_by_id(pool, claims.sub)
        .await?
        .ok_or(Error::Unauthorized("Invalid bearer token"))?;

    if !user.is_active {
        return Err(Error::Forbidden("User is not activated"));
    }

    Ok(Principal {
        user_id: user.id,
        email: user.email,
        username: user.username,
        role: user.role,
    })
}

/// [`require_auth`] plus the declared-role check for the route.
///
/// # Errors
/// Same as [`require_auth`], plus `Forbidden` when the caller's global role
/// is not in `required`.
pub async fn require_role(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    required: &[UserRole],
) -> Result<Principal, Error> {
    let principal = require_auth(headers, pool, state).await?;
    if !role_allowed(required, Some(principal.role)) {
        return Err(Error::Forbidden("Insufficient role"));
    }
    Ok(principal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn empty_required_set_allows_anyone() {
        assert!(role_allowed(&[], Some(UserRole::User)));
        assert!(role_allowed(&[], None));
    }

    #[test]
    fn matching_role_is_allowed() {
        assert!(role_allowed(
            &[UserRole::Admin, UserRole::User],
            Some(UserRole::User)
        ));
        assert!(role_allowed(&[UserRole::Admin], Some(UserRole::Admin)));
    }

    #[test]
    fn missing_or_wrong_role_is_denied() {
        assert!(!role_allowed(&[UserRole::Admin], Some(UserRole::User)));
        assert!(!role_allowed(&[UserRole::Admin], None));
    }

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwdw=="),
        );
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn bearer_token_extracts_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn empty_bearer_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer "),
        );
        assert_eq!(bearer_token(&headers), None);
    }
}
