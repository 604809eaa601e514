//! Worker process: pulls trial grants from the coordinator and runs the
//! external simulator under a bounded concurrency budget.

mod agent;
mod client;
mod runner;
mod telemetry;

use anyhow::Result;
use botforge_core::{load_or_default, WorkerConfig};
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1);
    let config: WorkerConfig = load_or_default(config_path.as_deref())?;

    telemetry::init_telemetry()?;

    info!("Starting Botforge worker");
    info!("Coordinator URL: {}", config.coordinator_url);

    let client = Arc::new(client::CoordinatorClient::new(config.clone())?);
    info!(
        worker_id = client.worker_id(),
        max_concurrent_trials = config.max_concurrent_trials,
        "worker ready"
    );

    let runner = Arc::new(runner::ProcessTrialRunner::new(config.simulator.clone()));
    let trial_agent = agent::TrialAgent::new(client, runner, &config);

    let shutdown = CancellationToken::new();
    let agent_task = {
        let shutdown = shutdown.clone();
        let poll_interval = Duration::from_millis(config.poll_interval_ms);
        tokio::spawn(async move { trial_agent.run(shutdown, poll_interval).await })
    };

    shutdown_signal().await;

    info!("Shutting down worker");
    shutdown.cancel();

    // In-flight trials are allowed to finish, up to a grace period.
    match tokio::time::timeout(Duration::from_secs(30), agent_task).await {
        Ok(result) => {
            result??;
            info!("Agent finished cleanly");
        }
        Err(_) => {
            info!("Shutdown timeout reached");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
