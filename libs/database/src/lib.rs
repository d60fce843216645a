//! PostgreSQL connectivity for the onboarding services
//!
//! Pool configuration from the environment, connection with exponential
//! backoff, migrations, and a `SELECT 1` readiness probe.
//!
//! ```ignore
//! use core_config::FromEnv;
//! use database::postgres::{self, PostgresConfig};
//! use database::common::RetryPolicy;
//!
//! let config = PostgresConfig::from_env()?;
//! let db = postgres::connect_with_retry(&config, RetryPolicy::startup()).await?;
//! postgres::run_migrations::<migration::Migrator>(&db).await?;
//! ```

pub mod common;
pub mod postgres;

pub use common::{DatabaseError, DatabaseResult, RetryPolicy};
