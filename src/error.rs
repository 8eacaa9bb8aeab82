//! Crate-wide error taxonomy and HTTP mapping.
//!
//! Business operations return a coarse classification (conflict, not found,
//! unauthorized, forbidden, expired, unavailable) that the HTTP layer maps to
//! a status code. Store errors are logged and collapsed to 500; their text is
//! never included in a response body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum Error {
    /// Duplicate unique key, e.g. email already registered.
    #[error("{0}")]
    Conflict(&'static str),

    /// Referenced entity absent: user, workspace, membership, token.
    #[error("{0}")]
    NotFound(&'static str),

    /// Missing or invalid credentials.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// Authenticated but insufficient privilege, or credential mismatch.
    #[error("{0}")]
    Forbidden(&'static str),

    /// Single-use token past its deadline.
    #[error("Invalid or expired token")]
    Expired,

    /// Downstream store or notifier unreachable.
    #[error("{0}")]
    Unavailable(&'static str),

    /// Internal failure with no caller-actionable classification.
    #[error("{0}")]
    Internal(&'static str),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl Error {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) | Self::Expired => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Self::Database(err) => {
                error!("Database error: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            other => (other.status(), other.to_string()).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_409() {
        assert_eq!(
            Error::Conflict("User already exists").status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn not_found_and_expired_map_to_404() {
        assert_eq!(Error::NotFound("No such user").status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::Expired.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn privilege_errors_map_to_401_and_403() {
        assert_eq!(
            Error::Unauthorized("Missing bearer token").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::Forbidden("Credentials incorrect").status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn unavailable_maps_to_503() {
        assert_eq!(
            Error::Unavailable("Store unreachable").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn database_errors_are_opaque() {
        let response = Error::Database(sqlx::Error::RowNotFound).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn expired_message_does_not_leak_detail() {
        assert_eq!(Error::Expired.to_string(), "Invalid or expired token");
    }
}
