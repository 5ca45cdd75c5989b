//! Model artifact resolution
//!
//! Local artifacts are read in place. Everything else (registry models, run
//! artifacts, object stores) is fetched through `mlflow artifacts download`,
//! which already knows how to talk to those backends.

use mlinfer_core::{
    MlinferError, MlinferResult, ModelDescriptor, PyfuncFlavor, MLMODEL_FILE_NAME,
};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::uri::{local_file_uri, ModelUri};

/// Resolves model URIs to local directories
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    /// Path to the mlflow executable
    mlflow_path: PathBuf,
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new(PathBuf::from("mlflow"))
    }
}

impl ArtifactStore {
    /// Create a new artifact store
    pub fn new(mlflow_path: PathBuf) -> Self {
        Self { mlflow_path }
    }

    /// Download a model artifact and return its local directory.
    ///
    /// Without an output path, local artifacts are returned in place and
    /// remote ones land in a temporary directory that outlives this call.
    pub async fn download(
        &self,
        uri: &ModelUri,
        output_path: Option<&Path>,
    ) -> MlinferResult<PathBuf> {
        match uri {
            ModelUri::Local(path) => {
                if !path.exists() {
                    return Err(MlinferError::Artifact(format!(
                        "No such file or directory: {}",
                        path.display()
                    )));
                }
                match output_path {
                    None => Ok(path.clone()),
                    Some(output) => {
                        copy_tree_async(path.clone(), output.to_path_buf()).await?;
                        Ok(output.to_path_buf())
                    }
                }
            }
            _ => {
                let dst = match output_path {
                    Some(output) => output.to_path_buf(),
                    None => tempfile::Builder::new()
                        .prefix("mlinfer-model-")
                        .tempdir()?
                        .keep(),
                };
                self.mlflow_download(&uri.to_string(), &dst).await
            }
        }
    }

    /// Download a model artifact and return it as a `file://` URI
    pub async fn download_uri(
        &self,
        uri: &ModelUri,
        output_path: Option<&Path>,
    ) -> MlinferResult<String> {
        let path = self.download(uri, output_path).await?;
        Ok(local_file_uri(&path))
    }

    /// Download a single file of a model artifact
    pub async fn download_file(
        &self,
        uri: &ModelUri,
        file: &str,
        output_path: &Path,
    ) -> MlinferResult<PathBuf> {
        match uri {
            ModelUri::Local(path) => {
                let local = path.join(file);
                if local.exists() {
                    Ok(local)
                } else {
                    Err(MlinferError::Artifact(format!(
                        "No such file or directory: {}",
                        local.display()
                    )))
                }
            }
            _ if uri.supports_sub_paths() => {
                self.mlflow_download(&uri.append_path(file).to_string(), output_path)
                    .await
            }
            _ => {
                let root = self.mlflow_download(&uri.to_string(), output_path).await?;
                Ok(root.join(file))
            }
        }
    }

    /// Fetch and parse the model descriptor
    pub async fn load_descriptor(
        &self,
        uri: &ModelUri,
        output_path: Option<&Path>,
    ) -> MlinferResult<ModelDescriptor> {
        let scratch = tempfile::tempdir()?;
        let output = output_path.unwrap_or_else(|| scratch.path());
        let path = self.download_file(uri, MLMODEL_FILE_NAME, output).await?;
        ModelDescriptor::from_file(&path)
    }

    /// Fetch the descriptor and return its pyfunc flavor configuration
    pub async fn model_config(
        &self,
        uri: &ModelUri,
        output_path: Option<&Path>,
    ) -> MlinferResult<PyfuncFlavor> {
        self.load_descriptor(uri, output_path).await?.pyfunc_flavor()
    }

    async fn mlflow_download(&self, uri: &str, dst: &Path) -> MlinferResult<PathBuf> {
        info!(uri = uri, dst = %dst.display(), "Downloading artifact");

        let output = Command::new(&self.mlflow_path)
            .arg("artifacts")
            .arg("download")
            .arg("--artifact-uri")
            .arg(uri)
            .arg("--dst-path")
            .arg(dst)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                MlinferError::Process(format!(
                    "Failed to run {}: {}",
                    self.mlflow_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(MlinferError::Artifact(format!(
                "Failed to download {} ({}): {}",
                uri,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // mlflow prints the local path of what it downloaded last
        let stdout = String::from_utf8_lossy(&output.stdout);
        let local = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(PathBuf::from)
            .filter(|path| path.exists())
            .unwrap_or_else(|| dst.to_path_buf());

        debug!(uri = uri, path = %local.display(), "Artifact downloaded");
        Ok(local)
    }
}

/// Recursively copy the contents of `src` into `dst`
pub fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    if src.is_file() {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(src, dst)?;
        return Ok(());
    }

    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// [`copy_tree`] on the blocking pool
pub async fn copy_tree_async(src: PathBuf, dst: PathBuf) -> MlinferResult<()> {
    tokio::task::spawn_blocking(move || copy_tree(&src, &dst))
        .await
        .map_err(|e| MlinferError::Artifact(format!("Copy task failed: {}", e)))??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MLMODEL: &str = "flavors:\n  python_function:\n    env: conda.yaml\n    loader_module: mlflow.sklearn\n";

    fn write_model(dir: &Path, mlmodel: &str) {
        std::fs::create_dir_all(dir.join("data")).unwrap();
        std::fs::write(dir.join(MLMODEL_FILE_NAME), mlmodel).unwrap();
        std::fs::write(dir.join("conda.yaml"), "name: test\n").unwrap();
        std::fs::write(dir.join("data").join("model.pkl"), b"pickle").unwrap();
    }

    #[tokio::test]
    async fn test_model_config_local() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), MLMODEL);

        let store = ArtifactStore::default();
        let uri = ModelUri::Local(dir.path().to_path_buf());
        let flavor = store.model_config(&uri, None).await.unwrap();

        assert_eq!(
            serde_json::to_value(&flavor).unwrap(),
            json!({"env": "conda.yaml", "loader_module": "mlflow.sklearn"})
        );
    }

    #[tokio::test]
    async fn test_model_config_missing_flavor() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), "flavors:\n  keras:\n    keras_version: 2.4.0\n");

        let store = ArtifactStore::default();
        let uri = ModelUri::parse(&local_file_uri(dir.path()));
        let result = store.model_config(&uri, None).await;

        assert!(matches!(result, Err(MlinferError::UnsupportedFlavor)));
    }

    #[tokio::test]
    async fn test_missing_local_artifact() {
        let store = ArtifactStore::default();
        let uri = ModelUri::Local(PathBuf::from("/nonexistent/model"));

        assert!(matches!(
            store.download(&uri, None).await,
            Err(MlinferError::Artifact(_))
        ));
        assert!(matches!(
            store.model_config(&uri, None).await,
            Err(MlinferError::Artifact(_))
        ));
    }

    #[tokio::test]
    async fn test_download_local_in_place_and_copied() {
        let src = tempfile::tempdir().unwrap();
        write_model(src.path(), MLMODEL);
        let store = ArtifactStore::default();
        let uri = ModelUri::Local(src.path().to_path_buf());

        let in_place = store.download(&uri, None).await.unwrap();
        assert_eq!(in_place, src.path());

        let dst = tempfile::tempdir().unwrap();
        let copied = store.download(&uri, Some(dst.path())).await.unwrap();
        assert_eq!(copied, dst.path());
        assert!(dst.path().join(MLMODEL_FILE_NAME).exists());
        assert!(dst.path().join("data").join("model.pkl").exists());

        let file_uri = store.download_uri(&uri, None).await.unwrap();
        assert!(file_uri.starts_with("file:///"));
    }

    #[tokio::test]
    async fn test_remote_without_mlflow() {
        let store = ArtifactStore::new(PathBuf::from("/nonexistent/bin/mlflow"));
        let uri = ModelUri::parse("s3://bucket/model");
        let dst = tempfile::tempdir().unwrap();

        let result = store.download(&uri, Some(dst.path())).await;
        assert!(matches!(result, Err(MlinferError::Process(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_remote_through_mlflow_cli() {
        use std::os::unix::fs::PermissionsExt;

        let bin = tempfile::tempdir().unwrap();
        let mlflow = bin.path().join("mlflow");
        std::fs::write(
            &mlflow,
            r#"#!/bin/sh
uri="$4"
dst="$6"
body='flavors:
  python_function:
    loader_module: mlflow.sklearn'
case "$uri" in
  */MLmodel)
    mkdir -p "$dst"
    printf '%s\n' "$body" > "$dst/MLmodel"
    echo "$dst/MLmodel"
    ;;
  *)
    mkdir -p "$dst/model"
    printf '%s\n' "$body" > "$dst/model/MLmodel"
    echo "$dst/model"
    ;;
esac
"#,
        )
        .unwrap();
        std::fs::set_permissions(&mlflow, std::fs::Permissions::from_mode(0o755)).unwrap();

        let store = ArtifactStore::new(mlflow);

        // Sub-path download of the descriptor only
        let run = ModelUri::parse("runs:/abc123/model");
        let flavor = store.model_config(&run, None).await.unwrap();
        assert_eq!(flavor.loader_module(), Some("mlflow.sklearn"));

        // Registry models are downloaded whole
        let registry = ModelUri::parse("models:/iris/3");
        let dst = tempfile::tempdir().unwrap();
        let path = store.download(&registry, Some(dst.path())).await.unwrap();
        assert_eq!(path, dst.path().join("model"));
        assert!(store.model_config(&registry, None).await.is_ok());

        // Without an output path the download lands in a directory that outlives the call
        let kept = store.download(&registry, None).await.unwrap();
        assert!(kept.join("MLmodel").is_file());
        let root = kept.parent().unwrap();
        assert!(root
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("mlinfer-model-"));
        std::fs::remove_dir_all(root).unwrap();
    }
}
