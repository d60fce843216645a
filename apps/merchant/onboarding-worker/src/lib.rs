//! Onboarding Worker Service
//!
//! Consumes `merchant.created` and registers each merchant with the chain
//! registration capability.
//!
//! ## Architecture
//!
//! ```text
//! RabbitMQ (merchant.created.q, prefetch 1)
//!   ↓
//! AmqpWorker<MerchantCreated, OnboardingProcessor>
//!   ↓ ledger check, then register
//! ChainRegistrar ──▶ chain_registrations (PostgreSQL)
//!   ↓ on failure
//! merchant.created.retry.q (TTL) or merchant.created.dlq
//! ```

pub mod config;
pub mod health;

use amqp_worker::{AmqpWorker, BrokerConnection, Topology, WorkerConfig, metrics};
use axum_helpers::server::{ShutdownCoordinator, close_postgres};
use core_config::tracing::{init_tracing, install_color_eyre};
use database::RetryPolicy;
use domain_merchants::{
    MERCHANT_CREATED, MerchantCreated, OnboardingProcessor, PgMerchantRepository, build_registrar,
};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use config::Config;
use health::HealthState;

const BROKER_CONNECT_RETRIES: u32 = 10;

async fn start_health_server(
    state: HealthState,
    port: u16,
    coordinator: ShutdownCoordinator,
) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {addr}"))?;

    info!(port, "Health server listening");

    axum::serve(listener, health::router(state))
        .with_graceful_shutdown(async move { coordinator.wait().await })
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Run the onboarding worker until SIGINT/SIGTERM or a lost broker
/// connection.
///
/// # Errors
///
/// Returns an error if configuration is invalid, PostgreSQL or RabbitMQ
/// cannot be reached at startup, or the broker connection drops while
/// consuming.
pub async fn run() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

    let prometheus = match metrics::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    };

    info!(
        name = config.app.name,
        version = config.app.version,
        environment = ?config.environment,
        "Starting onboarding worker"
    );

    let db = database::postgres::connect_with_retry(&config.database, RetryPolicy::startup())
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;

    let broker = Arc::new(
        BrokerConnection::connect_with_retry(&config.amqp, BROKER_CONNECT_RETRIES)
            .await
            .wrap_err("Failed to connect to RabbitMQ")?,
    );

    let registrar = build_registrar(&config.chain).wrap_err("Failed to build chain registrar")?;
    info!(registrar = registrar.name(), "Chain registrar selected");

    let ledger = Arc::new(PgMerchantRepository::new(db.clone()));
    let processor = OnboardingProcessor::new(ledger, registrar);

    let topology = Topology::new(&config.amqp.exchange, MERCHANT_CREATED);
    let worker_config = WorkerConfig::from_env(topology)?;
    info!(
        queue = %worker_config.topology.queue,
        consumer_tag = %worker_config.consumer_tag,
        prefetch = worker_config.prefetch,
        "Worker configuration loaded"
    );

    let coordinator = ShutdownCoordinator::new();
    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.listen_for_signals().await });
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator.wait().await;
            let _ = shutdown_tx.send(true);
        });
    }

    let health_state = HealthState {
        db: db.clone(),
        broker: broker.clone(),
        metrics: prometheus,
    };
    {
        let coordinator = coordinator.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = start_health_server(health_state, port, coordinator).await {
                error!(error = %e, "Health server failed");
            }
        });
    }

    let worker = AmqpWorker::<MerchantCreated, _>::new(broker.clone(), processor, worker_config);
    let outcome = worker.run(shutdown_rx).await;

    coordinator.shutdown();
    if let Err(e) = broker.close().await {
        warn!(error = %e, "Error closing RabbitMQ connection");
    }
    close_postgres(db).await;

    outcome.wrap_err("Worker stopped on a broker error")?;
    info!("Onboarding worker stopped");
    Ok(())
}
