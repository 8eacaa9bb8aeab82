//! Request/response types shared by the auth handlers.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Global role on the user record, distinct from per-workspace roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

impl UserRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Parse a role as stored in the database.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    /// Defaults to `user` when omitted.
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestPasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PasswordResetLinkResponse {
    pub link: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub user_id: i64,
    pub token: String,
    pub password: String,
}

/// Outward-facing user representation. Never carries the password hash.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_storage_form() {
        assert_eq!(UserRole::parse(UserRole::Admin.as_str()), Some(UserRole::Admin));
        assert_eq!(UserRole::parse(UserRole::User.as_str()), Some(UserRole::User));
        assert_eq!(UserRole::parse("owner"), None);
    }

    #[test]
    fn role_defaults_to_user() {
        assert_eq!(UserRole::default(), UserRole::User);
    }

    #[test]
    fn register_request_accepts_missing_role() {
        let request: RegisterRequest = serde_json::from_str(
            r#"{"email":"a@example.com","username":"alice","password":"pw"}"#,
        )
        .expect("deserialize");
        assert!(request.role.is_none());
    }
}
