//! Shared application state.

use crate::broker::BrokerPublisher;
use crate::config::Config;
use domain_merchants::OnboardingService;
use std::sync::Arc;

/// Cloned per request; every field is a handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// PostgreSQL pool, shared with the repository inside `service`.
    pub db: database::postgres::DatabaseConnection,
    pub publisher: Arc<BrokerPublisher>,
    pub service: OnboardingService,
}
