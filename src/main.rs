use agent_eval::config::AppConfig;
use agent_eval::db::seed;
use agent_eval::state::{AppState, SharedState};
use agent_eval::web;
use axum::{extract::Request, Router, ServiceExt};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tower::Layer;
use tower_http::{normalize_path::NormalizePathLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;
    tracing::info!("Database migrations completed");

    seed::seed_all(&pool, &config).await?;

    let shared: SharedState = Arc::new(AppState::new(pool, &config));

    let scheduler = JobScheduler::new().await?;

    // Login limiter cleanup - forget idle IPs every hour
    let shared_for_cleanup = shared.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let state = shared_for_cleanup.clone();
            Box::pin(async move {
                let remaining = state.login_limiter.prune().await;
                tracing::info!("Login limiter pruned, {} addresses still tracked", remaining);
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!("Scheduler started: login limiter cleanup hourly");

    let app = Router::new()
        .merge(web::routes(shared.clone()))
        .layer(web::cors_layer(config.cors_origin.as_deref()))
        .layer(TraceLayer::new_for_http());

    // Trailing slashes are trimmed before routing so `/api/forms/` and
    // `/api/forms` hit the same handler.
    let app = NormalizePathLayer::trim_trailing_slash().layer(app);

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(
        listener,
        ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
    )
    .await?;
    Ok(())
}
