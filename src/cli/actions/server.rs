use crate::{
    api,
    api::email::EmailWorkerConfig,
    api::handlers::auth::AuthConfig,
    token::TokenIssuer,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub client_base_url: String,
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub verification_ttl_seconds: i64,
    pub reset_ttl_seconds: i64,
    pub mail_endpoint: Option<String>,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the mail endpoint is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let auth_config = AuthConfig::new(args.client_base_url)
        .with_verification_ttl_seconds(args.verification_ttl_seconds)
        .with_reset_ttl_seconds(args.reset_ttl_seconds);

    let issuer = TokenIssuer::new(args.access_token_secret, args.refresh_token_secret)
        .with_access_ttl_seconds(args.access_token_ttl_seconds)
        .with_refresh_ttl_seconds(args.refresh_token_ttl_seconds);

    let email_config = EmailWorkerConfig {
        poll_interval: Duration::from_secs(args.email_outbox_poll_seconds),
        batch_size: args.email_outbox_batch_size,
        max_attempts: args.email_outbox_max_attempts,
        backoff_base: Duration::from_secs(args.email_outbox_backoff_base_seconds),
        backoff_max: Duration::from_secs(args.email_outbox_backoff_max_seconds),
    };

    let mail_endpoint = args
        .mail_endpoint
        .as_deref()
        .map(Url::parse)
        .transpose()
        .context("Invalid mail endpoint URL")?;

    api::new(
        args.port,
        args.dsn,
        auth_config,
        issuer,
        email_config,
        mail_endpoint,
    )
    .await
}

fn log_startup_args(args: &Args) {
    let mail = if args.mail_endpoint.is_some() {
        "http"
    } else {
        "log"
    };
    info!(
        port = args.port,
        mail_sender = mail,
        "Starting {} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
}
