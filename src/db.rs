use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Type alias for the PostgreSQL connection pool
pub type DbPool = PgPool;

/// Creates and configures a PostgreSQL connection pool
///
/// # Arguments
/// * `database_url` - PostgreSQL connection string
///
/// # Returns
/// * `Result<DbPool>` - Configured connection pool or error
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    tracing::debug!("Creating database connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await?;

    tracing::info!("Database connection pool created successfully");
    Ok(pool)
}

/// Runs the embedded migrations against the pool
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Migrations completed successfully");
    Ok(())
}
