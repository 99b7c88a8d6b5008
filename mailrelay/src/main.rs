//! Mailrelay Worker - runs the scheduled background tasks.
//!
//! Registers the built-in tasks (queue processing, cleanup, sending of
//! immediate entries and the weekly summary) and fires whatever is due on
//! every tick until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailrelay::{AppContext, Config, TaskRunner};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("worker_starting");

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        mailer = %config.mailer,
        queue_enabled = config.queue_enabled,
        process_interval_secs = config.process_interval_secs,
        tick_interval_secs = config.tick_interval_secs,
        summary_report_disabled = config.summary_report_disabled,
        "config_loaded"
    );

    let tick = Duration::from_secs(config.tick_interval_secs.max(1));
    let ctx = Arc::new(AppContext::from_config(config).await?);

    let runner = TaskRunner::with_defaults();
    runner.init_all(&ctx).await;

    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let ran = runner.run_due(&ctx, Utc::now()).await;
                if ran > 0 {
                    debug!(tasks_run = ran, "worker_tick");
                }
            }
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "signal_handler_failed");
                }
                info!("worker_shutting_down");
                break;
            }
        }
    }

    info!("worker_shutdown_complete");
    Ok(())
}
