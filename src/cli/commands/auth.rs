use clap::{Arg, Command};

pub fn with_args(command: Command) -> Command {
    let command = with_link_args(command);
    with_token_args(command)
}

fn with_link_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("client-base-url")
                .long("client-base-url")
                .help("Client base URL used for verification and reset links")
                .env("TESSERA_CLIENT_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new("verification-ttl-seconds")
                .long("verification-ttl-seconds")
                .help("Email verification token TTL in seconds")
                .env("TESSERA_VERIFICATION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("reset-ttl-seconds")
                .long("reset-ttl-seconds")
                .help("Password reset token TTL in seconds")
                .env("TESSERA_RESET_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("access-token-secret")
                .long("access-token-secret")
                .help("HS256 signing secret for access tokens")
                .env("TESSERA_ACCESS_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("refresh-token-secret")
                .long("refresh-token-secret")
                .help("HS256 signing secret for refresh tokens")
                .env("TESSERA_REFRESH_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("access-token-ttl-seconds")
                .long("access-token-ttl-seconds")
                .help("Access token TTL in seconds")
                .env("TESSERA_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("refresh-token-ttl-seconds")
                .long("refresh-token-ttl-seconds")
                .help("Refresh token TTL in seconds")
                .env("TESSERA_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
}
