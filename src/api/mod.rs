//! HTTP surface: router assembly and server startup.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    Extension,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

use crate::auth::{AuthConfig, AuthService};
use crate::cache::RedisCounterCache;
use crate::mailer::{self, OutboxWorkerConfig, PgOutboxNotifier};
use crate::storage::PgCredentialStore;

pub(crate) mod handlers;
mod openapi;

pub use handlers::Backend;
pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Connect the adapters, spawn the outbox worker, and serve until SIGINT.
///
/// # Errors
/// Returns an error if the database, cache, or listener cannot be set up.
pub async fn serve(
    port: u16,
    dsn: &str,
    redis_url: &str,
    auth_config: AuthConfig,
    worker_config: OutboxWorkerConfig,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    let cache = RedisCounterCache::new(redis_url)?;
    let notifier = PgOutboxNotifier::new(pool.clone());
    let backend: Arc<Backend> = Arc::new(AuthService::new(
        PgCredentialStore::new(pool.clone()),
        cache,
        notifier,
        auth_config,
    ));

    // Background worker drains email_outbox (DB-backed queue) and retries
    // failures with exponential backoff.
    mailer::spawn_outbox_worker(
        pool.clone(),
        Arc::new(mailer::LogMessageSender),
        worker_config,
    );

    let (router, _openapi) = router().split_for_parts();
    let app = router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(backend))
            .layer(Extension(pool)),
    );

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
