// Worker clippy configuration
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Bookly Background Worker
//!
//! Handles:
//! - Mail delivery from the Redis queue, with retries
//! - Dead-letter requeue (every 15 minutes)

mod config;
mod consumer;
mod delivery;
mod queue;

use std::sync::Arc;

use tokio::sync::watch;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::consumer::consume;
use crate::delivery::{retry_strategy, LogTransport, MailTransport, ResendTransport};
use crate::queue::MailQueue;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Bookly Worker");

    let config = WorkerConfig::from_env()?;

    let client = redis::Client::open(config.redis_url.as_str())?;
    let conn = redis::aio::ConnectionManager::new(client).await?;
    let queue = MailQueue::new(conn);
    info!("Redis connection established");

    let transport: Arc<dyn MailTransport> = match config.resend_api_key.clone() {
        Some(api_key) => {
            info!(url = %config.mail_api_url, "Delivering mail through HTTP API");
            Arc::new(ResendTransport::new(
                api_key,
                config.mail_from.clone(),
                config.mail_api_url.clone(),
            ))
        }
        None => {
            warn!("RESEND_API_KEY not set - running in log-only mode");
            Arc::new(LogTransport)
        }
    };

    let mut scheduler = JobScheduler::new().await?;

    // Dead-letter requeue every 15 minutes
    let requeue_queue = queue.clone();
    scheduler
        .add(Job::new_async("0 */15 * * * *", move |_uuid, _l| {
            let queue = requeue_queue.clone();
            Box::pin(async move {
                info!("Running dead-letter requeue");
                if let Err(e) = queue.requeue_dead_letters().await {
                    error!(error = %e, "Dead-letter requeue failed");
                }
            })
        })?)
        .await?;
    info!("Scheduled: Dead-letter requeue (every 15 minutes)");

    scheduler.start().await?;

    info!("Bookly Worker started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = tokio::spawn(async move {
        consume(&queue, transport.as_ref(), shutdown_rx, retry_strategy).await;
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received, finishing in-flight mail job");

    shutdown_tx.send_replace(true);
    if let Err(e) = consumer.await {
        error!(error = %e, "Mail consumer task failed");
    }
    if let Err(e) = scheduler.shutdown().await {
        warn!(error = %e, "Scheduler did not shut down cleanly");
    }

    info!("Bookly Worker stopped");
    Ok(())
}
