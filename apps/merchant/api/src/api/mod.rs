use axum::{Json, Router, routing::get};
use axum_helpers::server::{health_router, with_common_layers};
use database::postgres::DatabaseConnection;
use domain_merchants::{OnboardingService, handlers};

use crate::state::AppState;

pub mod health;

pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// The full application router: `/v1` API, docs, liveness and readiness.
pub fn routes(state: &AppState) -> Router {
    app_router(state.service.clone(), state.db.clone())
}

pub fn app_router(service: OnboardingService, db: DatabaseConnection) -> Router {
    let docs = crate::openapi::api_doc();

    let router = Router::new()
        .nest("/v1", handlers::router(service))
        .route(
            OPENAPI_PATH,
            get(move || {
                let docs = docs.clone();
                async move { Json(docs) }
            }),
        )
        .merge(health_router())
        .merge(ready_router(db));

    with_common_layers(router)
}

/// `/ready` with a real database probe.
pub fn ready_router(db: DatabaseConnection) -> Router {
    Router::new()
        .route("/ready", get(health::ready_handler))
        .with_state(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum_helpers::{JwtConfig, TokenIssuer};
    use domain_merchants::{InMemoryMerchantRepository, StubRegistrar};
    use http_body_util::BodyExt;
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase};
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn service() -> OnboardingService {
        let repo = Arc::new(InMemoryMerchantRepository::new());
        let tokens = TokenIssuer::new(
            &JwtConfig::new("router-test-secret-with-32-plus-chars").unwrap(),
        );
        OnboardingService::new(repo.clone(), repo, Arc::new(StubRegistrar), tokens)
    }

    fn healthy_db() -> DatabaseConnection {
        let row: BTreeMap<&str, sea_orm::Value> =
            BTreeMap::from([("?column?", sea_orm::Value::Int(Some(1)))]);
        MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row]])
            .into_connection()
    }

    fn failing_db() -> DatabaseConnection {
        MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_errors([DbErr::Custom("connection refused".into())])
            .into_connection()
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_is_ok() {
        let (status, body) = get_json(app_router(service(), healthy_db()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_ready_reflects_database() {
        let (status, body) = get_json(app_router(service(), healthy_db()), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], "connected");

        let (status, body) = get_json(app_router(service(), failing_db()), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["database"], "disconnected");
        assert_eq!(body["ready"], false);
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let (status, body) = get_json(app_router(service(), healthy_db()), OPENAPI_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"].get("/v1/auth/register").is_some());
    }

    #[tokio::test]
    async fn test_auth_routes_live_under_v1() {
        let (status, _) = get_json(app_router(service(), healthy_db()), "/v1/auth/me").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = get_json(app_router(service(), healthy_db()), "/auth/me").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_object());
    }
}
