//! Docker image build flow

use mlinfer_core::{BuildConfig, MlinferError, MlinferResult};
use mlinfer_runtime::run_streaming;
use mlinfer_store::{copy_tree_async, ArtifactStore, ModelUri};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;

use crate::binary::check_server_binary;
use crate::dockerfile::{
    generate_dockerfile, DockerfileOptions, BIN_DIR, EXTRA_LIBS_DIR, SERVER_BINARY,
};

/// Download a package built for manylinux x86_64 into `dest`, streaming pip's output
pub async fn download_manylinux_package(
    pip_path: &Path,
    package_src: &str,
    dest: &Path,
) -> MlinferResult<()> {
    let mut cmd = Command::new(pip_path);
    cmd.arg("download")
        .arg("--platform=manylinux1_x86_64")
        .arg("-d")
        .arg(dest)
        .arg("--no-deps")
        .arg(package_src);

    run_streaming(cmd).await
}

/// Builds docker images serving a model
pub struct DockerImageBuilder {
    config: BuildConfig,
    server_binary: PathBuf,
    store: ArtifactStore,
}

impl DockerImageBuilder {
    /// Create a builder bundling the given server binary
    pub fn new(config: BuildConfig, server_binary: PathBuf) -> Self {
        let store = ArtifactStore::new(config.mlflow_path.clone());
        Self {
            config,
            server_binary,
            store,
        }
    }

    /// Build image `image_name` for the model at `model_uri`
    pub async fn build(&self, image_name: &str, model_uri: &str) -> MlinferResult<()> {
        let context = tempfile::Builder::new()
            .prefix("mlinfer-build-")
            .tempdir()?;

        self.prepare_context(model_uri, context.path()).await?;

        info!(
            image = image_name,
            context = %context.path().display(),
            "Building docker image"
        );

        let mut cmd = Command::new(&self.config.docker_path);
        cmd.arg("build")
            .arg("-t")
            .arg(image_name)
            .arg(".")
            .current_dir(context.path());

        run_streaming(cmd)
            .await
            .map_err(|e| MlinferError::Build(format!("docker build of {} failed: {}", image_name, e)))?;

        info!(image = image_name, "Docker image built");
        Ok(())
    }

    /// Lay out the build context and return the Dockerfile path
    pub async fn prepare_context(&self, model_uri: &str, context: &Path) -> MlinferResult<PathBuf> {
        self.verify_server_binary().await?;

        let uri = ModelUri::parse(model_uri);
        let flavor = self.store.model_config(&uri, None).await?;

        if uri.is_local() {
            self.store.download(&uri, Some(context)).await?;
        } else {
            let staging = tempfile::tempdir()?;
            let model_dir = self.store.download(&uri, Some(staging.path())).await?;
            copy_tree_async(model_dir, context.to_path_buf()).await?;
        }

        let extra_libs = context.join(EXTRA_LIBS_DIR);
        for source in self.config.extra_packages.values() {
            download_manylinux_package(&self.config.pip_path, source, &extra_libs).await?;
        }

        self.copy_server_binary(context).await?;

        let packages: Vec<String> = self.config.extra_packages.keys().cloned().collect();
        let content = generate_dockerfile(&flavor, &packages, &DockerfileOptions::from(&self.config));
        let dockerfile = context.join("Dockerfile");
        tokio::fs::write(&dockerfile, content).await?;

        Ok(dockerfile)
    }

    async fn verify_server_binary(&self) -> MlinferResult<()> {
        if !self.server_binary.is_file() {
            return Err(MlinferError::Build(format!(
                "server binary not found at {}",
                self.server_binary.display()
            )));
        }

        let data = tokio::fs::read(&self.server_binary).await?;
        check_server_binary(&data).map_err(|e| match e {
            MlinferError::Build(reason) => MlinferError::Build(format!(
                "{} ({})",
                reason,
                self.server_binary.display()
            )),
            other => other,
        })
    }

    async fn copy_server_binary(&self, context: &Path) -> MlinferResult<()> {
        let bin_dir = context.join(BIN_DIR);
        tokio::fs::create_dir_all(&bin_dir).await?;
        tokio::fs::copy(&self.server_binary, bin_dir.join(SERVER_BINARY)).await?;
        Ok(())
    }
}
