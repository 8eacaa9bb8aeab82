//! # Tessera (Workspace Membership & Authentication)
//!
//! `tessera` is a multi-tenant workspace backend: user registration and
//! password authentication, signed access/refresh token issuance, email
//! verification and password reset via single-use hashed tokens, and
//! workspace CRUD with owner/admin/member roles.
//!
//! ## Accounts & Tokens
//!
//! - **Passwords** are hashed with Argon2id; only the hash is stored and it
//!   never appears in any response.
//! - **Bearer tokens** are HS256 JWTs: a short-lived access token and a
//!   refresh token signed with an independent secret. The latest refresh
//!   token is persisted per user.
//! - **Single-use tokens** (email verification, password reset) are 256-bit
//!   secrets stored only as a SHA-256 hash with a per-kind TTL. Redemption
//!   is a conditional delete, so each secret can be consumed at most once
//!   even under concurrent attempts.
//!
//! ## Workspaces & Membership
//!
//! Workspaces carry exactly one `owner` membership, created with the
//! workspace in one transaction. Owners mutate and delete workspaces;
//! owners and admins manage members; the owner can never be removed.
//! Listings are paginated and role-filtered, with the global `admin` role
//! seeing every workspace.
//!
//! ## Outbound Email
//!
//! Emails are decoupled from request handling through a transactional
//! outbox (`email_outbox`): rows are enqueued with the state change that
//! needs them and delivered at-least-once by a background worker.

pub mod api;
pub mod cli;
pub mod error;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
