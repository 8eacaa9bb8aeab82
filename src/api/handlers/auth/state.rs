//! Auth configuration and shared state.

use std::sync::Arc;

use crate::token::TokenIssuer;

const DEFAULT_VERIFICATION_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_RESET_TTL_SECONDS: i64 = 15 * 60;

/// Explicitly constructed configuration for the auth flows: link base URL and
/// single-use token lifetimes. Signing secrets live in [`TokenIssuer`].
#[derive(Clone, Debug)]
pub struct AuthConfig {
    client_base_url: String,
    verification_ttl_seconds: i64,
    reset_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(client_base_url: String) -> Self {
        Self {
            client_base_url,
            verification_ttl_seconds: DEFAULT_VERIFICATION_TTL_SECONDS,
            reset_ttl_seconds: DEFAULT_RESET_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_verification_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_ttl_seconds = seconds;
        self
    }

    pub(crate) fn client_base_url(&self) -> &str {
        &self.client_base_url
    }

    pub(super) fn verification_ttl_seconds(&self) -> i64 {
        self.verification_ttl_seconds
    }

    pub(super) fn reset_ttl_seconds(&self) -> i64 {
        self.reset_ttl_seconds
    }
}

/// Shared state handed to handlers as an `Extension<Arc<AuthState>>`.
pub struct AuthState {
    config: AuthConfig,
    issuer: TokenIssuer,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, issuer: TokenIssuer) -> Arc<Self> {
        Arc::new(Self { config, issuer })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let config = AuthConfig::new("https://app.tessera.dev".to_string());
        assert_eq!(config.verification_ttl_seconds(), 24 * 60 * 60);
        assert_eq!(config.reset_ttl_seconds(), 15 * 60);
    }

    #[test]
    fn builders_override_ttls() {
        let config = AuthConfig::new("https://app.tessera.dev".to_string())
            .with_verification_ttl_seconds(60)
            .with_reset_ttl_seconds(30);
        assert_eq!(config.verification_ttl_seconds(), 60);
        assert_eq!(config.reset_ttl_seconds(), 30);
    }
}
