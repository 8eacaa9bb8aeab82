use crate::{
    api::handlers::{auth, health, root},
    token::TokenIssuer,
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, options},
};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

pub(crate) mod email;
pub(crate) mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use openapi::openapi;

pub use crate::{APP_USER_AGENT, GIT_COMMIT_HASH};

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Start the server.
///
/// # Errors
/// Returns an error if the database is unreachable, the client base URL is
/// invalid, or the listener fails to bind.
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: auth::AuthConfig,
    issuer: TokenIssuer,
    email_config: email::EmailWorkerConfig,
    mail_endpoint: Option<Url>,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let client_origin = client_origin(auth_config.client_base_url())?;
    let auth_state = auth::AuthState::new(auth_config, issuer);

    // Background worker polls email_outbox (DB-backed queue) for pending rows,
    // delivers them, and retries failures with exponential backoff.
    match mail_endpoint {
        Some(endpoint) => {
            email::spawn_outbox_worker(pool.clone(), email::HttpEmailSender::new(endpoint), email_config)
        }
        None => email::spawn_outbox_worker(pool.clone(), email::LogEmailSender, email_config),
    };

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_origin(AllowOrigin::exact(client_origin))
        .allow_credentials(true);

    // Build the router from OpenAPI-wired routes, then extend it with non-doc
    // routes like `/` and preflight-only `OPTIONS /health`. The spec stays in
    // openapi.rs for the `openapi` binary.
    let (router, _openapi) = router().split_for_parts();
    let app = router
        .route("/", get(root::root))
        .route("/health", options(health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state)),
        )
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn client_origin(client_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(client_base_url)
        .with_context(|| format!("Invalid client base URL: {client_base_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Client base URL must include a valid host: {client_base_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build client origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_origin_strips_path() {
        let origin = client_origin("https://app.tessera.dev/verify/").expect("origin");
        assert_eq!(origin, HeaderValue::from_static("https://app.tessera.dev"));
    }

    #[test]
    fn client_origin_keeps_explicit_port() {
        let origin = client_origin("http://localhost:5173").expect("origin");
        assert_eq!(origin, HeaderValue::from_static("http://localhost:5173"));
    }

    #[test]
    fn client_origin_rejects_garbage() {
        assert!(client_origin("not a url").is_err());
    }
}
