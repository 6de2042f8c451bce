use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use careerhub_backend::{
    config::Config,
    db::{create_pool, DbPool},
    models::identity::Identity,
    repositories::PgSessionBackend,
    routes,
    services::{live_sessions::LiveSessions, session_backend::SessionBackend},
    state::AppState,
    types::UserId,
    utils::time::{Clock, SystemClock},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "careerhub_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(config = ?config, "Loaded configuration from environment/.env");

    // Initialize database
    let pool: DbPool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(pool.as_ref()).await?;

    let backend: Arc<dyn SessionBackend> =
        Arc::new(PgSessionBackend::new(pool.clone(), config.feed_channel.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // The server keeps one all-sessions view; it also runs the sweeper.
    let service_identity = Identity::admin(UserId::from_uuid(uuid::Uuid::nil()));
    let mut live = LiveSessions::start(
        backend.clone(),
        clock.clone(),
        service_identity,
        config.live_sessions(),
    );

    let state = AppState::new(backend, live.reader(), clock, config.clone());
    let app = routes::router(state);

    // Start server
    tracing::info!("Server listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    live.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
