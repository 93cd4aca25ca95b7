//! OOM Terminator
//!
//! Watches pods in a Kubernetes cluster and gracefully deletes the ones that
//! stay over a percentage of their memory limit, before the kernel OOM killer
//! gets to them.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use terminator_lib::{KubeClusterApi, LoopHealth, StructuredLogger, TerminatorMetrics};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod cli;

use cli::{Cli, Commands, LogFormat, TerminateArgs};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Terminate(args) => terminate(args).await,
    };

    if let Err(e) = result {
        error!(error = %format!("{:#}", e), "OOM terminator failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(args: &TerminateArgs) {
    // RUST_LOG takes precedence over --debug
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_directive()));

    let registry = tracing_subscriber::registry().with(filter);
    match args.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

async fn terminate(args: TerminateArgs) -> Result<()> {
    init_tracing(&args);

    let logger = StructuredLogger::new(args.dry_run);
    let namespace = (!args.namespace.is_empty()).then_some(args.namespace.as_str());
    logger.log_startup(VERSION, namespace, &args.services, &args.deployments);

    let kubeconfig = args.kubeconfig_path();
    let api = KubeClusterApi::connect(kubeconfig.as_deref())
        .await
        .context("Failed to connect to the Kubernetes cluster")?;

    let health = LoopHealth::new(args.health_stale_after());
    let terminator = args
        .loop_builder()
        .api(Arc::new(api))
        .health(health.clone())
        .logger(logger.clone())
        .build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        let reason = wait_for_signal().await;
        logger.log_shutdown(reason);
        let _ = shutdown_tx.send(());
    });

    let metrics_server = async {
        match args.metrics_port {
            Some(port) => {
                let state = Arc::new(api::AppState::new(health, TerminatorMetrics::new()));
                api::serve(port, state).await
            }
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = terminator.run(shutdown_rx) => {
            result.context("Terminator loop failed")?;
        }
        result = metrics_server => {
            result.context("Health and metrics server failed")?;
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM and return which one arrived
async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => "SIGINT received",
                    _ = sigterm.recv() => "SIGTERM received",
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT received"
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT received"
    }
}
