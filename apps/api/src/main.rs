mod admin;
mod assessment_client;
mod auth;
mod config;
mod db;
mod errors;
mod files;
mod marks;
mod models;
mod polling;
mod questionnaire;
mod routes;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::http::{header, HeaderValue, Method};
use tokio::sync::watch;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::assessment_client::HttpAssessmentClient;
use crate::auth::JwtVerifier;
use crate::config::Config;
use crate::db::create_pool;
use crate::files::storage::{DiskStorage, ReportStorage, S3Storage};
use crate::polling::{PollPolicy, PollScheduler};
use crate::questionnaire::orchestrator::Orchestrator;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::postgres::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Career API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.db_max_connections).await?;
    let store = Arc::new(PgStore::new(db));

    // Initialize assessment service client
    let assessment = Arc::new(HttpAssessmentClient::new(
        config.assessment_base_url.clone(),
        config.assessment_timeout,
    )?);
    info!("Assessment client initialized ({})", config.assessment_base_url);

    // Initialize report storage
    let reports: Arc<dyn ReportStorage> = match &config.s3 {
        Some(s3) => Arc::new(S3Storage::new(s3).await),
        None => Arc::new(DiskStorage::new(&config.upload_dir)?),
    };

    // Start the poll scheduler; it resumes any tasks left pending by a previous run
    let policy = PollPolicy::from_config(&config);
    let scheduler = Arc::new(PollScheduler::new(
        store.clone(),
        store.clone(),
        assessment.clone(),
        policy,
    ));
    let poll_handle = scheduler.handle();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

    // Build app state
    let state = AppState {
        store: store.clone(),
        orchestrator: Orchestrator::new(store, assessment, poll_handle),
        reports,
        auth: JwtVerifier::new(&config.jwt_secret),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_task.await {
        warn!("Poll scheduler exited abnormally: {e}");
    }

    Ok(())
}

/// Permissive when no origins are configured (local development).
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{o}'");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(86400))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
