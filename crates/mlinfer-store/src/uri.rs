//! Model URI classification

use std::path::{Path, PathBuf};

/// A model location as accepted on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelUri {
    /// Path on the local filesystem, given bare or as a `file:` URI
    Local(PathBuf),
    /// Registered model (`models:/name/version` or `models:/name/stage`)
    Registry(String),
    /// Artifact of a tracking run (`runs:/run_id/path`)
    Run(String),
    /// Any other artifact store (`s3://`, `gs://`, `http://`, ...)
    Remote(String),
}

impl ModelUri {
    /// Classify a URI string
    pub fn parse(uri: &str) -> Self {
        if let Some(path) = uri.strip_prefix("file://") {
            return ModelUri::Local(PathBuf::from(path));
        }
        if let Some(path) = uri.strip_prefix("file:") {
            return ModelUri::Local(PathBuf::from(path));
        }
        if uri.starts_with("models:") {
            return ModelUri::Registry(uri.to_string());
        }
        if uri.starts_with("runs:") {
            return ModelUri::Run(uri.to_string());
        }
        if uri.contains("://") {
            return ModelUri::Remote(uri.to_string());
        }
        ModelUri::Local(PathBuf::from(uri))
    }

    /// Whether the artifact is already on this machine
    pub fn is_local(&self) -> bool {
        matches!(self, ModelUri::Local(_))
    }

    /// Registered models cannot be addressed below their root
    pub fn supports_sub_paths(&self) -> bool {
        !matches!(self, ModelUri::Registry(_))
    }

    /// Append a relative path to the URI
    pub fn append_path(&self, file: &str) -> Self {
        let file = file.trim_start_matches('/');
        match self {
            ModelUri::Local(path) => ModelUri::Local(path.join(file)),
            ModelUri::Registry(uri) => ModelUri::Registry(join_uri(uri, file)),
            ModelUri::Run(uri) => ModelUri::Run(join_uri(uri, file)),
            ModelUri::Remote(uri) => ModelUri::Remote(join_uri(uri, file)),
        }
    }

    /// Image name derived from the last two URI segments (`models:/iris/3` is `iris:3`)
    pub fn default_image_name(uri: &str) -> String {
        let segments: Vec<&str> = uri.split('/').collect();
        let start = segments.len().saturating_sub(2);
        segments[start..].join(":")
    }
}

impl std::fmt::Display for ModelUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelUri::Local(path) => write!(f, "{}", path.display()),
            ModelUri::Registry(uri) | ModelUri::Run(uri) | ModelUri::Remote(uri) => {
                write!(f, "{}", uri)
            }
        }
    }
}

fn join_uri(uri: &str, file: &str) -> String {
    format!("{}/{}", uri.trim_end_matches('/'), file)
}

/// Render a local path as a `file://` URI
pub fn local_file_uri(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    format!("file://{}", absolute.display())
}
