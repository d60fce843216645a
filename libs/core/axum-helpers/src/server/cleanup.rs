use tracing::{error, info};

/// Close the pool explicitly so shutdown logs show it happened.
pub async fn close_postgres(db: sea_orm::DatabaseConnection) {
    match db.close().await {
        Ok(()) => info!("PostgreSQL pool closed"),
        Err(e) => error!(error = %e, "Error closing PostgreSQL pool"),
    }
}
