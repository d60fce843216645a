//! # Axum Helpers
//!
//! Shared HTTP plumbing for the onboarding services.
//!
//! ## Modules
//!
//! - **[`auth`]**: HS256 access tokens and the `AuthUser` bearer extractor
//! - **[`server`]**: common layers, liveness/readiness, graceful shutdown
//! - **[`errors`]**: the `{"error":{"type","message"}}` envelope
//! - **[`extractors`]**: `ValidatedJson`
//!
//! ## Quick Start
//!
//! ```ignore
//! use axum_helpers::server::{create_production_app, health_router, with_common_layers, ShutdownCoordinator};
//!
//! let app = with_common_layers(api_routes.merge(health_router()));
//! create_production_app(app, &server_config, ShutdownCoordinator::new(), Duration::from_secs(30), async {}).await?;
//! ```

pub mod auth;
pub mod errors;
pub mod extractors;
pub mod server;

pub use auth::{ACCESS_TOKEN_TTL, AuthError, AuthUser, Claims, IssuedToken, JwtConfig, TokenIssuer};

pub use server::{
    HealthCheckFuture, HealthResponse, ShutdownCoordinator, close_postgres, create_production_app,
    health_router, run_health_checks, with_common_layers,
};

pub use errors::{AppError, ErrorBody, ErrorResponse};

pub use extractors::ValidatedJson;
