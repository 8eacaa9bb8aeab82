//! Bearer token issuance and verification.
//!
//! Access and refresh tokens are HS256 JWTs signed with two independent
//! secrets. Both carry `{sub, email}` and a short fixed expiry. Verification
//! checks signature and expiry only; the persisted refresh token is not
//! consulted here.

use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Both tokens currently share a 15-minute lifetime. Production deployments
/// should differentiate access vs. refresh TTLs via the builder methods.
pub const DEFAULT_TOKEN_TTL_SECONDS: i64 = 15 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Signing-key misconfiguration. Fatal, not retried.
    #[error("failed to sign token")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
}

/// Signs and verifies the access/refresh token pair.
#[derive(Clone)]
pub struct TokenIssuer {
    access_secret: SecretString,
    refresh_secret: SecretString,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(access_secret: SecretString, refresh_secret: SecretString) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    /// Sign a new token pair for the user. Persisting the refresh token is
    /// the caller's responsibility.
    ///
    /// # Errors
    /// Returns [`Error::Signing`] if the signing key is unusable.
    pub fn issue(&self, user_id: i64, email: &str) -> Result<TokenPair, Error> {
        let access_token = self.sign(
            user_id,
            email,
            self.access_ttl_seconds,
            &self.access_secret,
        )?;
        let refresh_token = self.sign(
            user_id,
            email,
            self.refresh_ttl_seconds,
            &self.refresh_secret,
        )?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Verify an access token's signature and expiry.
    ///
    /// # Errors
    /// Returns [`Error::Expired`] past the deadline, [`Error::Invalid`] on a
    /// bad signature or malformed token.
    pub fn verify_access(&self, token: &str) -> Result<Claims, Error> {
        verify(token, &self.access_secret)
    }

    /// Verify a refresh token's signature and expiry.
    ///
    /// # Errors
    /// Same classification as [`Self::verify_access`].
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, Error> {
        verify(token, &self.refresh_secret)
    }

    fn sign(
        &self,
        user_id: i64,
        email: &str,
        ttl_seconds: i64,
        secret: &SecretString,
    ) -> Result<String, Error> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now,
            exp: now + ttl_seconds,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
        )
        .map_err(Error::Signing)
    }
}

fn verify(token: &str, secret: &SecretString) -> Result<Claims, Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|err| match err.kind() {
        ErrorKind::ExpiredSignature => Error::Expired,
        _ => Error::Invalid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            SecretString::from("access-secret".to_string()),
            SecretString::from("refresh-secret".to_string()),
        )
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let pair = issuer().issue(42, "a@example.com").expect("issue");
        let claims = issuer().verify_access(&pair.access_token).expect("verify");
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.email, "a@example.com");
        assert_eq!(claims.exp - claims.iat, DEFAULT_TOKEN_TTL_SECONDS);
    }

    #[test]
    fn tokens_are_independently_keyed() {
        let pair = issuer().issue(1, "a@example.com").expect("issue");
        assert_ne!(pair.access_token, pair.refresh_token);
        // An access token must not verify against the refresh secret and
        // vice versa.
        assert!(matches!(
            issuer().verify_refresh(&pair.access_token),
            Err(Error::Invalid)
        ));
        assert!(matches!(
            issuer().verify_access(&pair.refresh_token),
            Err(Error::Invalid)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let pair = issuer().issue(1, "a@example.com").expect("issue");
        let other = TokenIssuer::new(
            SecretString::from("different".to_string()),
            SecretString::from("secrets".to_string()),
        );
        assert!(matches!(
            other.verify_access(&pair.access_token),
            Err(Error::Invalid)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let expired = issuer().with_access_ttl_seconds(-60);
        let pair = expired.issue(1, "a@example.com").expect("issue");
        assert!(matches!(
            issuer().verify_access(&pair.access_token),
            Err(Error::Expired)
        ));
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(matches!(
            issuer().verify_access("not-a-token"),
            Err(Error::Invalid)
        ));
    }

    #[test]
    fn refresh_round_trip() {
        let pair = issuer().issue(7, "b@example.com").expect("issue");
        let claims = issuer()
            .verify_refresh(&pair.refresh_token)
            .expect("verify refresh");
        assert_eq!(claims.sub, 7);
    }
}
