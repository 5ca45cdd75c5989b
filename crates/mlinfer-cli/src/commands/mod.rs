//! CLI commands implementation

use anyhow::{Context, Result};
use mlinfer_build::dockerfile::SERVER_BINARY;
use mlinfer_build::DockerImageBuilder;
use mlinfer_core::{BuildConfig, MlinferError, MODEL_URI_ENV, SERVER_ARGS_ENV};
use mlinfer_runtime::run_inherited;
use mlinfer_store::{ArtifactStore, ModelUri};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

/// Serve a model with the inference server, blocking until it exits
pub async fn serve(
    model_uri: &str,
    port: u16,
    workers: u32,
    server_bin: Option<PathBuf>,
) -> Result<()> {
    if cfg!(windows) {
        return Err(MlinferError::UnsupportedPlatform("Windows".to_string()).into());
    }

    let store = ArtifactStore::default();
    let uri = ModelUri::parse(model_uri);

    // Fails early on non-pyfunc models
    store.model_config(&uri, None).await?;
    let local_uri = store.download_uri(&uri, None).await?;
    info!(model_uri = %local_uri, "Model artifact ready");

    let server_bin = match server_bin {
        Some(path) => path,
        None => default_server_binary()?,
    };

    let extra = std::env::var(SERVER_ARGS_ENV).ok();
    let args = server_args(port, workers, extra.as_deref());
    debug!(args = ?args, "Starting server");

    let mut cmd = Command::new(&server_bin);
    cmd.env(MODEL_URI_ENV, &local_uri).args(&args);

    run_inherited(cmd).await?;
    Ok(())
}

/// Build a docker image serving the model
pub async fn build_docker(
    model_uri: &str,
    name: Option<String>,
    server_bin: Option<PathBuf>,
) -> Result<()> {
    let name = name.unwrap_or_else(|| ModelUri::default_image_name(model_uri));

    // Images need a Linux server binary, which only a Linux host has by default
    let server_bin = match server_bin {
        Some(path) => path,
        None if cfg!(target_os = "linux") => default_server_binary()?,
        None => {
            return Err(MlinferError::UnsupportedPlatform(std::env::consts::OS.to_string()).into())
        }
    };

    let builder = DockerImageBuilder::new(BuildConfig::default(), server_bin);
    builder.build(&name, model_uri).await?;

    println!("Image '{}' built successfully", name);
    Ok(())
}

/// Arguments passed to the inference server
fn server_args(port: u16, workers: u32, extra: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "--host".to_string(),
        "0.0.0.0".to_string(),
        "--port".to_string(),
        port.to_string(),
        "--workers".to_string(),
        workers.to_string(),
    ];
    if let Some(extra) = extra {
        args.extend(extra.split_whitespace().map(str::to_string));
    }
    args
}

/// The server binary installed next to the running executable
fn default_server_binary() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the current executable")?;
    Ok(exe.with_file_name(format!(
        "{}{}",
        SERVER_BINARY,
        std::env::consts::EXE_SUFFIX
    )))
}
