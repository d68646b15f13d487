use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use curbwatch_cache::{InvalidationCoordinator, ReadCache};
use curbwatch_common::Config;
use curbwatch_engine::CallbackHandler;
use curbwatch_events::{ActivityLog, EventPublisher, EventSubscriber};
use curbwatch_store::PgStore;

mod auth;
mod response;
mod rest;

pub struct AppState {
    pub store: Arc<PgStore>,
    pub callbacks: CallbackHandler<PgStore>,
    pub cache: Arc<ReadCache>,
    pub invalidator: InvalidationCoordinator,
    pub publisher: EventPublisher,
    pub config: Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("curbwatch=info".parse()?))
        .init();

    let config = Config::from_env();

    let store = Arc::new(PgStore::connect(&config.database_url).await?);
    store.ensure_schema().await?;

    let cache = Arc::new(ReadCache::new());
    cache.spawn_purge_loop();

    let subscribers: Vec<Arc<dyn EventSubscriber>> = vec![Arc::new(ActivityLog)];
    let publisher = EventPublisher::start(
        subscribers,
        config.event_queue_capacity,
        config.event_workers,
    );

    // All wiring is explicit and in one place.
    let state = Arc::new(AppState {
        callbacks: CallbackHandler::new(store.clone()),
        invalidator: InvalidationCoordinator::new(cache.clone()),
        store,
        cache,
        publisher,
        config: config.clone(),
    });

    let app = Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Classifier webhook
        .route("/api/callbacks/validation", post(rest::callback::validation_callback))
        // Reports
        .route("/api/reports", post(rest::reports::submit_report))
        .route("/api/users/{id}/reports", get(rest::reports::user_reports))
        // Issues
        .route("/api/issues/{id}", get(rest::issues::issue_detail))
        .route("/api/issues/{id}/status", post(rest::issues::set_issue_status))
        .route("/api/issues/near", get(rest::issues::issues_near))
        // Statistics
        .route("/api/statistics", get(rest::issues::statistics))
        .with_state(state.clone())
        // CORS
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Logging layer: method + path + status + latency only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Curbwatch API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain enqueued events before exiting.
    state.publisher.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
