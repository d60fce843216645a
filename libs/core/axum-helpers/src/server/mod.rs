//! Server plumbing: shared layers, liveness/readiness, graceful shutdown.
//!
//! ```ignore
//! use axum_helpers::server::{create_production_app, health_router, with_common_layers, ShutdownCoordinator};
//!
//! let coordinator = ShutdownCoordinator::new();
//! let app = with_common_layers(api_routes.merge(health_router()));
//! create_production_app(app, &config.server, coordinator, Duration::from_secs(30), cleanup).await?;
//! ```

pub mod app;
pub mod cleanup;
pub mod health;
pub mod shutdown;

pub use app::{create_production_app, with_common_layers};
pub use cleanup::close_postgres;
pub use health::{HealthCheckFuture, HealthResponse, health_router, run_health_checks};
pub use shutdown::ShutdownCoordinator;
