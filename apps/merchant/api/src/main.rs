use amqp_worker::Topology;
use axum_helpers::server::{ShutdownCoordinator, close_postgres, create_production_app};
use axum_helpers::TokenIssuer;
use core_config::tracing::{init_tracing, install_color_eyre};
use database::RetryPolicy;
use domain_merchants::{
    MERCHANT_CREATED, OnboardingService, OutboxRelay, PgMerchantRepository, build_registrar,
};
use eyre::WrapErr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn};

mod api;
mod broker;
mod config;
mod openapi;
mod state;

use broker::BrokerPublisher;
use config::Config;
use state::AppState;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> eyre::Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);
    info!(
        name = config.app.name,
        version = config.app.version,
        environment = ?config.environment,
        "Starting merchant API"
    );

    let db = database::postgres::connect_with_retry(&config.database, RetryPolicy::startup())
        .await
        .wrap_err("PostgreSQL connection failed")?;

    if config.run_migrations {
        database::postgres::run_migrations::<migration::Migrator>(&db)
            .await
            .wrap_err("Migrations failed")?;
    }

    let publisher = Arc::new(BrokerPublisher::new(
        config.amqp.clone(),
        Topology::new(&config.amqp.exchange, MERCHANT_CREATED),
    ));
    publisher.warm_up().await;

    let registrar = build_registrar(&config.chain).wrap_err("Failed to build chain registrar")?;
    info!(registrar = registrar.name(), "Chain registrar selected");

    let repository = Arc::new(PgMerchantRepository::new(db.clone()));
    let signal = Arc::new(Notify::new());
    let service = OnboardingService::new(
        repository.clone(),
        repository.clone(),
        registrar,
        TokenIssuer::new(&config.jwt),
    )
    .with_chain_timeout(config.chain.timeout)
    .with_outbox_signal(signal.clone());

    if let Some(admin) = &config.admin {
        match service.bootstrap_admin(&admin.email, &admin.password).await {
            Ok(true) => info!(email = %admin.email, "Admin account created"),
            Ok(false) => info!(email = %admin.email, "Admin account already present"),
            Err(e) => warn!(error = %e, "Admin bootstrap failed"),
        }
    }

    let coordinator = ShutdownCoordinator::new();

    let relay = OutboxRelay::new(
        repository,
        publisher.clone(),
        signal,
        config.outbox.clone(),
    );
    let relay_task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { relay.run(async move { coordinator.wait().await }).await })
    };

    let state = AppState {
        config: Arc::new(config),
        db,
        publisher,
        service,
    };
    let app = api::routes(&state);
    let server = state.config.server.clone();

    create_production_app(
        app,
        &server,
        coordinator,
        SHUTDOWN_TIMEOUT,
        async move {
            info!("Shutting down: stopping outbox relay and closing connections");
            if let Err(e) = relay_task.await {
                error!(error = %e, "Outbox relay task failed");
            }
            tokio::join!(close_postgres(state.db), state.publisher.close());
        },
    )
    .await
    .wrap_err("Server error")?;

    info!("Merchant API shutdown complete");
    Ok(())
}
