//! Minos - Judgment Execution Engine for Olympus
//!
//! Consumes judgment jobs from a Redis Stream, runs each one inside an
//! isolated sandbox, and reports verdicts back over webhooks.

mod config;
mod consumer;
mod error;
mod job;
mod job_store;
mod limits;
mod metrics;
mod sandbox;
mod supervisor;
mod verdict;
mod webhook;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::consumer::JudgeConsumer;
use crate::job_store::JobStoreGateway;
use crate::limits::LimitsCatalog;
use crate::metrics::MetricsServer;
use crate::supervisor::JudgmentSupervisor;
use crate::webhook::WebhookDispatcher;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minos=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Minos judgment worker");

    let config = Config::from_env();
    tracing::info!(environment = %config.environment, "loaded configuration");

    tracing::info!("loading limits catalog...");
    let limits = Arc::new(LimitsCatalog::load(&config.limits)?);

    tracing::info!("connecting to redis...");
    let redis_cfg = deadpool_redis::Config::from_url(&config.redis_url);
    let redis_pool = redis_cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;

    let store = Arc::new(JobStoreGateway::new(redis_pool.clone()));
    let webhook = Arc::new(WebhookDispatcher::new(&config.webhook)?);
    let supervisor = Arc::new(JudgmentSupervisor::new(
        &config,
        limits.clone(),
        store.clone(),
        webhook.clone(),
    ));

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        tracing::info!("shutdown signal received, finishing current job...");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = MetricsServer::run(metrics_port).await {
            tracing::error!(error = %e, "metrics server error");
        }
    });

    let mut consumer = JudgeConsumer::new(config, redis_pool, shutdown, supervisor);
    consumer.initialize().await?;

    tracing::info!("minos ready, starting judge consumer loop");
    consumer.run().await?;

    // Drop the consumer (and with it the supervisor's webhook handle) so
    // this is the last owner, then release the dispatcher's connection pool.
    drop(consumer);
    match Arc::try_unwrap(webhook) {
        Ok(dispatcher) => dispatcher.shutdown(),
        Err(_) => tracing::warn!("webhook dispatcher still shared at shutdown, skipping close"),
    }

    tracing::info!("minos shutdown complete");
    Ok(())
}
