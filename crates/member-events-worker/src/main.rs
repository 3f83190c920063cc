//! # Member Events Worker
//!
//! Binary entry point.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Wires the SQS transport, queue client registry and member service
//! - Runs the event consumer until SIGINT/SIGTERM, then waits a bounded time
//!   for it to stop

use member_events_worker::config::LoggingConfig;
use member_events_worker::{build_consumer, Startup, StopReason, WorkerConfig};
use member_queue::shutdown_channel;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // -------------------------------------------------------------------------
    // Load configuration
    //
    // A malformed file or an environment variable that cannot be coerced to
    // the right type is a hard error. Absent files are not.
    // -------------------------------------------------------------------------
    let config = match WorkerConfig::load_from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&LoggingConfig::default());
            error!(error = %e, "Failed to load configuration; aborting");
            std::process::exit(3);
        }
    };

    init_tracing(&config.logging);
    info!("Starting member events worker");

    if let Err(e) = config.validate() {
        error!(error = %e, "Worker configuration is invalid; aborting");
        std::process::exit(3);
    }

    // -------------------------------------------------------------------------
    // Wire dependencies
    //
    // Without a queue the consumer is disabled and nothing else is built.
    // -------------------------------------------------------------------------
    let consumer = match build_consumer(&config) {
        Ok(Startup::Ready(consumer)) => consumer,
        Ok(Startup::Disabled) => {
            info!("Member events worker stopped");
            return Ok(());
        }
        Err(e) => {
            error!(error = %e, "Failed to wire worker dependencies; aborting");
            std::process::exit(3);
        }
    };

    // -------------------------------------------------------------------------
    // Run until the consumer stops on its own or a signal arrives
    // -------------------------------------------------------------------------
    let shutdown_timeout = config.shutdown_timeout();
    let (controller, signal) = shutdown_channel();
    let mut consumer_task = tokio::spawn(async move { consumer.run(signal).await });

    let result = tokio::select! {
        result = &mut consumer_task => result,
        _ = wait_for_shutdown_signal(shutdown_timeout) => {
            controller.shutdown();
            match tokio::time::timeout(shutdown_timeout, &mut consumer_task).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        timeout_secs = shutdown_timeout.as_secs(),
                        "Consumer did not stop within the shutdown timeout; exiting"
                    );
                    consumer_task.abort();
                    return Ok(());
                }
            }
        }
    };

    match result {
        Ok(outcome) => {
            info!(
                reason = ?outcome.reason,
                received = outcome.stats.received,
                sent = outcome.stats.sent,
                failed = outcome.stats.failed,
                malformed = outcome.stats.malformed,
                "Member events worker stopped"
            );
            if outcome.reason == StopReason::QueueUnavailable {
                std::process::exit(2);
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Consumer task failed");
            std::process::exit(1);
        }
    }
}

// ============================================================================
// Private helpers
// ============================================================================

/// Install the global subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Resolve on SIGINT or SIGTERM
async fn wait_for_shutdown_signal(shutdown_timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
        },
    }
}
