//! Authentication handlers: sign-up, sign-in, email verification, and
//! password reset, plus the principal/guard used by protected routes.

pub mod login;
pub mod password;
pub mod password_reset;
pub mod principal;
pub mod register;
pub(crate) mod state;
pub(crate) mod storage;
pub mod types;
pub(crate) mod utils;
pub mod verification;

pub use state::{AuthConfig, AuthState};

use sqlx::PgPool;
use tracing::error;

use self::types::TokenResponse;
use crate::error::Error;

/// Sign a token pair and persist the refresh token on the user row so later
/// sign-ins elsewhere can be detected.
pub(super) async fn issue_token_pair(
    pool: &PgPool,
    state: &AuthState,
    user_id: i64,
    email: &str,
) -> Result<TokenResponse, Error> {
    let pair = state.issuer().issue(user_id, email).map_err(|err| {
        // Signing-key misconfiguration is fatal for this request.
        error!("Failed to sign token pair: {err}");
        Error::Internal("Token issuance failed")
    })?;

    storage::set_refresh_token(pool, user_id, &pair.refresh_token).await?;

    Ok(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    })
}
