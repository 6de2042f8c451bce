use sqlx::postgres::{PgPool, PgPoolOptions};
use std::{sync::Arc, time::Duration};

pub type DbPool = Arc<PgPool>;

/// Connects the shared pool. The change-feed listener takes its own
/// connection from the same options, so size the pool for that.
pub async fn create_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    tracing::info!("database pool connected");
    Ok(Arc::new(pool))
}
