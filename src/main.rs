//! Reconciliation sweeper daemon.
//!
//! Long-running process that backstops lost reconciliation triggers: it
//! periodically scans for customers with pending inbound events and runs
//! a reconciliation pass for each. Safe to run alongside webhook-driven
//! inline triggers and other sweeper instances.

use std::error::Error;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use billing_reconciler::adapters::email::{EmailApiConfig, HttpNotificationSender};
use billing_reconciler::adapters::postgres::{PostgresBillingStore, PostgresTenantDirectory};
use billing_reconciler::adapters::provider::{HttpProviderClient, ProviderApiConfig};
use billing_reconciler::adapters::TracingTelemetrySink;
use billing_reconciler::application::reconciliation::{
    ReconciliationEngine, Sweeper, SweeperConfig,
};
use billing_reconciler::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(
            config.database.connect_timeout_secs,
        ))
        .connect(&config.database.url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Arc::new(
        PostgresBillingStore::new(pool.clone())
            .with_lock_timeout(config.reconciler.lock_timeout()),
    );

    let mut provider_config = ProviderApiConfig::new(config.provider.api_key.clone());
    if let Some(base_url) = &config.provider.api_base_url {
        provider_config = provider_config.with_base_url(base_url.clone());
    }
    let provider = Arc::new(HttpProviderClient::new(provider_config));

    let email_config = EmailApiConfig::new(
        config.email.api_key.clone(),
        config.email.from_email.clone(),
        config.email.from_name.clone(),
    );
    let notifications = Arc::new(HttpNotificationSender::new(email_config));

    let directory = Arc::new(PostgresTenantDirectory::new(pool.clone()));
    let telemetry = Arc::new(TracingTelemetrySink::new());

    let engine = Arc::new(ReconciliationEngine::new(
        store.clone(),
        store.clone(),
        provider,
        directory,
        notifications,
        telemetry,
    ));

    let sweeper = Sweeper::with_config(
        engine,
        store,
        SweeperConfig {
            interval: config.reconciler.sweep_interval(),
            batch_size: config.reconciler.sweep_batch_size,
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!(
        interval_secs = config.reconciler.sweep_interval_secs,
        batch_size = config.reconciler.sweep_batch_size,
        "reconciliation sweeper started"
    );
    sweeper.run(shutdown_rx).await;

    Ok(())
}
