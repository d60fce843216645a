//! Health, readiness and Prometheus endpoints for the worker.
//!
//! - `/health`: liveness
//! - `/ready`: database ping plus broker connection state
//! - `/metrics`: Prometheus text format

use amqp_worker::BrokerConnection;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_helpers::server::{HealthCheckFuture, health_router, run_health_checks};
use database::postgres::{DatabaseConnection, check_health};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

#[derive(Clone)]
pub struct HealthState {
    pub db: DatabaseConnection,
    /// Anything that can report the broker link; the live connection in production.
    pub broker: Arc<dyn BrokerStatus>,
    pub metrics: Option<PrometheusHandle>,
}

pub trait BrokerStatus: Send + Sync {
    fn is_connected(&self) -> bool;
}

impl BrokerStatus for BrokerConnection {
    fn is_connected(&self) -> bool {
        BrokerConnection::is_connected(self)
    }
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(health_router())
}

async fn ready_handler(State(state): State<HealthState>) -> Response {
    let checks: Vec<(&str, HealthCheckFuture<'_>)> = vec![
        (
            "database",
            Box::pin(async {
                check_health(&state.db)
                    .await
                    .map_err(|e| format!("Database ping failed: {e}"))
            }),
        ),
        (
            "broker",
            Box::pin(async {
                if state.broker.is_connected() {
                    Ok(())
                } else {
                    Err("RabbitMQ connection lost".to_string())
                }
            }),
        ),
    ];

    run_health_checks(checks).await.into_response()
}

async fn metrics_handler(State(state): State<HealthState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
