//! mlinfer inference server
//!
//! Loads the model named by `MODEL_URI` and serves it over HTTP.

use anyhow::Context;
use clap::Parser;
use mlinfer_api::{create_router, ModelState};
use mlinfer_core::{LoggingConfig, ServerConfig};
use mlinfer_runtime::PyfuncModel;
use mlinfer_store::ArtifactStore;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// mlinfer-server - HTTP inference server for pyfunc models
#[derive(Parser, Debug)]
#[command(name = "mlinfer-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind the HTTP server
    #[arg(long)]
    host: Option<String>,

    /// Port for the HTTP server
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of scoring workers
    #[arg(short, long)]
    workers: Option<u32>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    dump_config: bool,
}

impl Args {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.api.address = host.clone();
        }
        if let Some(port) = self.port {
            config.api.port = port;
        }
        if let Some(workers) = self.workers {
            config.runtime.workers = workers;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    if args.dump_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_logging(&config.logging)?;

    info!("Starting mlinfer server v{}", env!("CARGO_PKG_VERSION"));

    let listener = TcpListener::bind((config.api.address.as_str(), config.api.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                config.api.address, config.api.port
            )
        })?;

    info!("API server listening on {}", listener.local_addr()?);

    run(config, listener, shutdown_signal()).await
}

/// Load the model and serve it on `listener` until `shutdown` resolves.
///
/// Scoring workers are stopped on every exit path. A shutdown while the
/// model is still loading abandons the load and kills the workers it started.
async fn run<F>(config: ServerConfig, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown.await;
        let _ = stop_tx.send(true);
    });

    let model = tokio::select! {
        model = load_model(&config) => model,
        _ = stopped(stop_rx.clone()) => {
            info!("Shutdown requested while loading the model");
            return Ok(());
        }
    };

    let state = match &model {
        Ok(model) => ModelState::Loaded(model.clone()),
        Err(reason) => ModelState::Failed(reason.clone()),
    };

    let served = axum::serve(listener, create_router(state))
        .with_graceful_shutdown(stopped(stop_rx))
        .await;

    if let Ok(model) = model {
        info!("Stopping scoring workers");
        model.shutdown().await;
    }

    served.context("Server error")
}

async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

/// Load the configured model, keeping the failure reason for `/_status`
async fn load_model(config: &ServerConfig) -> Result<Arc<PyfuncModel>, String> {
    let Some(model_uri) = config.model_uri.as_deref() else {
        error!("MODEL_URI is not set, serving without a model");
        return Err("MODEL_URI is not set".to_string());
    };

    let store = ArtifactStore::new(config.runtime.mlflow_path.clone());
    let timeout = Duration::from_secs(config.api.request_timeout_secs);

    match PyfuncModel::load(model_uri, &config.runtime, timeout, &store).await {
        Ok(model) => Ok(Arc::new(model)),
        Err(e) => {
            error!(model_uri = model_uri, error = %e, "Failed to load model");
            Err(e.to_string())
        }
    }
}

fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = if logging.format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to set subscriber: {}", e))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
