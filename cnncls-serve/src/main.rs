//! cnncls-serve - Classifier inference service
//!
//! Serves `/predict`, `/train` and `/health` over HTTP. The prediction model
//! defaults to the trained model path named in the structural configuration.

use anyhow::{Context, Result};
use clap::Parser;
use cnncls_common::config::{
    load_structural, CONFIG_ENV_VAR, DEFAULT_CONFIG_FILE, DEFAULT_PARAMS_FILE, PARAMS_ENV_VAR,
};
use cnncls_common::logging::{LoggingConfig, LoggingContext};
use cnncls_pipeline::backend::NativeBackend;
use cnncls_serve::{build_router, pipeline_runner, AppState, PredictionService};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Command-line arguments for cnncls-serve
#[derive(Parser, Debug)]
#[command(name = "cnncls-serve")]
#[command(about = "CT-scan classifier inference service")]
#[command(version)]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "CNNCLS_PORT")]
    port: u16,

    /// Trained model file; defaults to model_trainer.trained_model_file_path
    #[arg(long)]
    model: Option<PathBuf>,

    /// Structural configuration document (YAML or TOML)
    #[arg(long, env = CONFIG_ENV_VAR, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Parameter document (YAML or TOML)
    #[arg(long, env = PARAMS_ENV_VAR, default_value = DEFAULT_PARAMS_FILE)]
    params: PathBuf,

    /// Directory for running_logs.log
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

fn main() -> Result<()> {
    // Set before the runtime spawns any worker threads
    std::env::set_var("LANG", "en_US.UTF-8");
    std::env::set_var("LC_ALL", "en_US.UTF-8");

    let args = Args::parse();

    let _logging = LoggingContext::init(&LoggingConfig {
        log_dir: args.log_dir.clone(),
        ..LoggingConfig::default()
    })?;

    info!("Starting cnncls-serve v{}", env!("CARGO_PKG_VERSION"));

    let model_path = match &args.model {
        Some(path) => path.clone(),
        None => load_structural(&args.config)
            .context("Failed to read model path from structural configuration")?
            .model_trainer
            .trained_model_file_path,
    };
    info!(model = %model_path.display(), "Prediction model");

    let prediction = PredictionService::new(Arc::new(NativeBackend::new()), model_path);
    let state = AppState::new(prediction, pipeline_runner(args.config.clone(), args.params.clone()));
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.host, args.port))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("Failed to bind to address")?;
        info!("Listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")
    })?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
