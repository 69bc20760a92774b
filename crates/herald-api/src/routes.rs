//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with tracing, compression, body limits, the
//! rate limiter, and all endpoint handlers.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use herald_core::config::HeraldConfig;
use herald_core::error::HeraldError;

use crate::handlers;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let limiter = RateLimiter::new(state.config.api.rate_limit_per_sec);
    let max_body = state.config.api.max_body_bytes;

    let api_routes = Router::new()
        .route("/mentions/unanswered", get(handlers::unanswered_mentions))
        .route(
            "/users/{username}/posts/unanswered",
            get(handlers::unanswered_posts),
        )
        .route("/ingest", post(handlers::ingest))
        .route("/reply_by_id", post(handlers::reply_by_id))
        .route("/post", post(handlers::post))
        .route("/repost", post(handlers::repost))
        .route("/items/{id}", get(handlers::get_item))
        .route("/authors/{author}", get(handlers::get_author))
        .route("/audit", get(handlers::list_audit))
        .layer(axum::middleware::from_fn(rate_limit_middleware))
        .layer(axum::Extension(limiter));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api_routes)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind to the configured host and port and serve until ctrl-c.
pub async fn start_server(config: &HeraldConfig, state: AppState) -> Result<(), HeraldError> {
    let addr = format!("{}:{}", config.general.host, config.general.port);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Herald API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Herald API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
