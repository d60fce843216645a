use sea_orm::{Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use super::PostgresConfig;
use crate::common::{RetryPolicy, retry_with_backoff};

pub async fn connect(config: &PostgresConfig) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(config.connect_options()).await?;
    info!(url = %config.redacted_url(), "Connected to PostgreSQL");
    Ok(db)
}

/// Connect, retrying with backoff while the server is unreachable.
pub async fn connect_with_retry(
    config: &PostgresConfig,
    policy: RetryPolicy,
) -> Result<DatabaseConnection, DbErr> {
    retry_with_backoff(|| connect(config), policy).await
}

/// Apply all pending migrations of `M`.
pub async fn run_migrations<M: MigratorTrait>(db: &DatabaseConnection) -> Result<(), DbErr> {
    info!("Running database migrations");
    M::up(db, None).await?;
    info!("Database migrations complete");
    Ok(())
}
