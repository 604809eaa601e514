//! Central coordination server: serves the trial protocol and drives the
//! evolutionary run.

mod api;
mod database;
mod evolution;
mod telemetry;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use botforge_core::{load_or_default, CoordinatorConfig};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1);
    let config: CoordinatorConfig = load_or_default(config_path.as_deref())?;

    telemetry::init_telemetry()?;

    info!(
        "Starting Botforge coordinator on {}:{}",
        config.bind_address, config.port
    );

    let db = database::Database::new(&config.database_path).await?;
    db.migrate().await?;

    let engine = Arc::new(evolution::EvolutionEngine::new(
        db.clone(),
        config.evolution.clone(),
    )?);

    // The run finishes on its own (generation cap or stagnation); the server
    // keeps answering until then or until a shutdown signal.
    let shutdown = CancellationToken::new();
    let run_handle = {
        let engine = engine.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match engine.run().await {
                Ok(summary) => info!(
                    generations = summary.generations_completed,
                    best_score = summary.best_score.unwrap_or(f64::NAN),
                    stagnated = summary.stopped_by_stagnation,
                    "evolution run finished"
                ),
                Err(e) => error!("evolution run failed: {}", e),
            }
            shutdown.cancel();
        })
    };

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/api/trials/request", post(api::request_trial))
        .route("/api/trials/submit", post(api::submit_result))
        .route("/api/stats", get(api::get_stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api::AppState { engine, db });

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Coordinator listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    run_handle.abort();

    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
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
        _ = token.cancelled() => {},
    }

    info!("Shutting down coordinator");
}
