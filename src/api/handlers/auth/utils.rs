//! Helpers for auth validation and single-use token handling.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use regex::Regex;
use sha2::{Digest, Sha256};

use super::storage::TokenKind;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Mint a 256-bit single-use secret for verification/reset links.
///
/// The raw value only ever appears in the link; the database stores a hash.
pub(super) fn generate_single_use_secret() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate single-use secret")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a single-use secret so the raw value never touches the database.
/// Redemption compares against this hash with a conditional delete.
pub(super) fn hash_single_use_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

/// Build the client-facing link for a verification or reset email.
/// Embeds the raw secret and the user id; the path segment selects the page.
pub(super) fn build_action_link(
    client_base_url: &str,
    kind: TokenKind,
    secret: &str,
    user_id: i64,
) -> String {
    let base = client_base_url.trim_end_matches('/');
    let segment = match kind {
        TokenKind::EmailVerification => "emailVerification",
        TokenKind::ResetPassword => "resetPassword",
    };
    format!("{base}/{segment}?token={secret}&id={user_id}")
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn secret_has_256_bits_of_entropy() {
        let decoded_len = generate_single_use_secret()
            .ok()
            .and_then(|secret| URL_SAFE_NO_PAD.decode(secret.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn secrets_are_unique() {
        let first = generate_single_use_secret().expect("secret");
        let second = generate_single_use_secret().expect("secret");
        assert_ne!(first, second);
    }

    #[test]
    fn hash_is_stable_and_discriminating() {
        let first = hash_single_use_secret("secret");
        let second = hash_single_use_secret("secret");
        let different = hash_single_use_secret("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
    }

    #[test]
    fn action_link_embeds_secret_and_id() {
        let link = build_action_link(
            "https://app.tessera.dev/",
            TokenKind::EmailVerification,
            "raw-secret",
            7,
        );
        assert_eq!(
            link,
            "https://app.tessera.dev/emailVerification?token=raw-secret&id=7"
        );
    }

    #[test]
    fn reset_link_uses_reset_segment() {
        let link = build_action_link(
            "https://app.tessera.dev",
            TokenKind::ResetPassword,
            "raw-secret",
            9,
        );
        assert!(link.starts_with("https://app.tessera.dev/resetPassword?"));
    }
}
