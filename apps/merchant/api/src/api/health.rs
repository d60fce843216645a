//! Readiness backed by a database ping.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use axum_helpers::server::{HealthCheckFuture, run_health_checks};
use database::postgres::{DatabaseConnection, check_health};

pub async fn ready_handler(State(db): State<DatabaseConnection>) -> Response {
    let checks: Vec<(&str, HealthCheckFuture<'_>)> = vec![(
        "database",
        Box::pin(async {
            check_health(&db)
                .await
                .map_err(|e| format!("Database ping failed: {e}"))
        }),
    )];

    run_health_checks(checks).await.into_response()
}
