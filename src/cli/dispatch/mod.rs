use crate::cli::actions::{Action, server::Args};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let client_base_url = matches
        .get_one::<String>("client-base-url")
        .cloned()
        .context("missing required argument: --client-base-url")?;

    let access_token_secret = matches
        .get_one::<String>("access-token-secret")
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --access-token-secret")?;
    let refresh_token_secret = matches
        .get_one::<String>("refresh-token-secret")
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --refresh-token-secret")?;

    let access_token_ttl_seconds = matches
        .get_one::<i64>("access-token-ttl-seconds")
        .copied()
        .unwrap_or(900);
    let refresh_token_ttl_seconds = matches
        .get_one::<i64>("refresh-token-ttl-seconds")
        .copied()
        .unwrap_or(900);
    let verification_ttl_seconds = matches
        .get_one::<i64>("verification-ttl-seconds")
        .copied()
        .unwrap_or(86400);
    let reset_ttl_seconds = matches
        .get_one::<i64>("reset-ttl-seconds")
        .copied()
        .unwrap_or(900);

    let mail_endpoint = matches.get_one::<String>("mail-endpoint").cloned();
    let email_outbox_poll_seconds = matches
        .get_one::<u64>("email-outbox-poll-seconds")
        .copied()
        .unwrap_or(5);
    let email_outbox_batch_size = matches
        .get_one::<usize>("email-outbox-batch-size")
        .copied()
        .unwrap_or(10);
    let email_outbox_max_attempts = matches
        .get_one::<u32>("email-outbox-max-attempts")
        .copied()
        .unwrap_or(5);
    let email_outbox_backoff_base_seconds = matches
        .get_one::<u64>("email-outbox-backoff-base-seconds")
        .copied()
        .unwrap_or(5);
    let email_outbox_backoff_max_seconds = matches
        .get_one::<u64>("email-outbox-backoff-max-seconds")
        .copied()
        .unwrap_or(300);

    Ok(Action::Server(Args {
        port,
        dsn,
        client_base_url,
        access_token_secret,
        refresh_token_secret,
        access_token_ttl_seconds,
        refresh_token_ttl_seconds,
        verification_ttl_seconds,
        reset_ttl_seconds,
        mail_endpoint,
        email_outbox_poll_seconds,
        email_outbox_batch_size,
        email_outbox_max_attempts,
        email_outbox_backoff_base_seconds,
        email_outbox_backoff_max_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{actions::Action, commands};

    #[test]
    fn handler_builds_server_action() {
        let matches = commands::new()
            .try_get_matches_from([
                "tessera",
                "--dsn",
                "postgres://localhost/tessera",
                "--access-token-secret",
                "access",
                "--refresh-token-secret",
                "refresh",
                "--port",
                "9000",
            ])
            .expect("matches");

        let Action::Server(args) = handler(&matches).expect("action");
        assert_eq!(args.port, 9000);
        assert_eq!(args.dsn, "postgres://localhost/tessera");
        assert_eq!(args.client_base_url, "http://localhost:3000");
        assert_eq!(args.verification_ttl_seconds, 86400);
        assert!(args.mail_endpoint.is_none());
    }
}
