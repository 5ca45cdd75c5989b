//! Configuration types for mlinfer

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::MlinferResult;

/// Environment variable carrying the model location for the server process
pub const MODEL_URI_ENV: &str = "MODEL_URI";

/// Prefix of environment overrides (`MLINFER_API__PORT=9000`)
pub const ENV_PREFIX: &str = "MLINFER";

/// Extra command-line arguments appended to the server invocation
pub const SERVER_ARGS_ENV: &str = "MLINFER_SERVER_ARGS";

/// Port the server listens on unless told otherwise
pub const DEFAULT_PORT: u16 = 8008;

/// Inference server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Location of the model to serve
    pub model_uri: Option<String>,
    /// API server configuration
    pub api: ApiConfig,
    /// Backend runtime configuration
    pub runtime: RuntimeConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file and the process environment
    pub fn load(path: Option<&Path>) -> MlinferResult<Self> {
        Self::load_with_env(path, std::env::vars().collect())
    }

    /// Load configuration against an explicit environment.
    ///
    /// Sources are layered file, then `MLINFER_*` variables, then `MODEL_URI`.
    pub fn load_with_env(path: Option<&Path>, env: HashMap<String, String>) -> MlinferResult<Self> {
        let model_uri = env.get(MODEL_URI_ENV).filter(|v| !v.is_empty()).cloned();

        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                File::new(&path.to_string_lossy(), FileFormat::Toml).required(true),
            );
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env)),
            )
            .set_override_option("model_uri", model_uri)?
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> MlinferResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to bind the HTTP server
    pub address: String,
    /// Port for the HTTP server
    pub port: u16,
    /// Timeout for a single prediction forwarded to a worker
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            request_timeout_secs: 60,
        }
    }
}

/// Backend runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Path to the mlflow executable
    pub mlflow_path: PathBuf,
    /// Environment manager passed to `mlflow models serve`
    pub env_manager: String,
    /// Number of scoring workers
    pub workers: u32,
    /// Address the workers bind
    pub worker_host: String,
    /// Port of the first worker, the rest follow consecutively
    pub worker_base_port: u16,
    /// How long a worker may take to pass its first health check
    pub startup_timeout_secs: u64,
    /// Delay between health checks while waiting for a worker
    pub health_check_interval_ms: u64,
    /// How predictions are spread across workers
    pub lb_strategy: LoadBalanceStrategy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mlflow_path: PathBuf::from("mlflow"),
            env_manager: "local".to_string(),
            workers: 1,
            worker_host: "127.0.0.1".to_string(),
            worker_base_port: 30000,
            startup_timeout_secs: 300,
            health_check_interval_ms: 500,
            lb_strategy: LoadBalanceStrategy::RoundRobin,
        }
    }
}

/// Load balancing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalanceStrategy {
    /// Round-robin load balancing
    RoundRobin,
    /// Random load balancing
    Random,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Docker image build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Path to the docker executable
    pub docker_path: PathBuf,
    /// Path to the pip executable
    pub pip_path: PathBuf,
    /// Path to the mlflow executable
    pub mlflow_path: PathBuf,
    /// Base image of the generated Dockerfile
    pub base_image: String,
    /// Port exposed by the image
    pub port: u16,
    /// Python packages bundled into the image, pip name to download source
    pub extra_packages: BTreeMap<String, String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            docker_path: PathBuf::from("docker"),
            pip_path: PathBuf::from("pip"),
            mlflow_path: PathBuf::from("mlflow"),
            base_image: "continuumio/miniconda3:latest".to_string(),
            port: DEFAULT_PORT,
            extra_packages: BTreeMap::from([("mlflow".to_string(), "mlflow".to_string())]),
        }
    }
}
