//! ExamJudge - Application Entry Point
//!
//! This is the main entry point for the ExamJudge server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use examjudge::{
    config::{SandboxIsolation, CONFIG},
    db::{repositories::ProblemRepository, Stores},
    handlers,
    judge::{metrics, RunnerRegistry, Sandbox, Scheduler},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let json_logs = CONFIG.server.json_logs;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| CONFIG.server.rust_log.clone().into()),
        )
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .init();

    tracing::info!("Starting ExamJudge server...");
    metrics::init_metrics();

    // Load the problem catalogue
    let problems_file = &CONFIG.storage.problems_file;
    let problems = ProblemRepository::load_from_file(problems_file)
        .with_context(|| format!("loading problems from {}", problems_file.display()))?;
    tracing::info!(count = problems.len(), "Loaded problem catalogue");

    let sandbox = Sandbox::new(CONFIG.sandbox.clone());
    match CONFIG.sandbox.isolation {
        SandboxIsolation::Namespaces => {
            sandbox.verify_isolation().await.context(
                "sandbox isolation is required; set SANDBOX_ISOLATION=none to run without it",
            )?;
            tracing::info!("Sandbox namespace isolation verified");
        }
        SandboxIsolation::Disabled => tracing::warn!(
            "Sandbox isolation is disabled: submissions can read the host filesystem"
        ),
    }

    // Clear workspaces left behind by a previous run
    let stats = sandbox.purge_stale_workspaces().await;
    tracing::info!(
        scanned = stats.dirs_scanned,
        deleted = stats.dirs_deleted,
        errors = stats.errors,
        "Workspace cleanup finished"
    );

    let registry = RunnerRegistry::with_defaults(&CONFIG.runtimes);
    tracing::info!(languages = ?registry.languages(), "Runners registered");

    let scheduler = Scheduler::new(
        Arc::new(registry),
        Arc::new(sandbox),
        CONFIG.judge.workers,
        Duration::from_millis(CONFIG.judge.prepare_time_limit_ms),
    );

    // Create application state
    let state = AppState::new(Stores::in_memory(problems), scheduler, CONFIG.clone());
    let app = handlers::app(state);

    // Start the server
    let addr = SocketAddr::new(CONFIG.server.host.parse()?, CONFIG.server.port);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
