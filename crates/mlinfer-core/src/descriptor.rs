//! `MLmodel` descriptor parsing and pyfunc flavor extraction

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::{MlinferError, MlinferResult};

/// Name of the descriptor file at the root of every model artifact
pub const MLMODEL_FILE_NAME: &str = "MLmodel";

/// Flavor key of the generic python function packaging convention
pub const PYFUNC_FLAVOR_NAME: &str = "python_function";

/// Key inside the pyfunc flavor naming the environment specification
pub const ENV_KEY: &str = "env";

/// Parsed `MLmodel` file
///
/// Only `flavors` is interpreted; every other top-level key is carried
/// through untouched so the descriptor serializes back to the full mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Flavors indexed by name
    #[serde(default)]
    pub flavors: Map<String, Value>,
    /// Remaining top-level keys (run_id, signature, utc_time_created, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelDescriptor {
    /// Parse a descriptor from its YAML text
    pub fn from_yaml_str(content: &str) -> MlinferResult<Self> {
        let descriptor: Option<Self> = serde_yaml::from_str(content)?;
        descriptor.ok_or_else(|| MlinferError::Descriptor("descriptor is empty".to_string()))
    }

    /// Read and parse a descriptor file
    pub fn from_file(path: &Path) -> MlinferResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MlinferError::Descriptor(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Extract the pyfunc flavor configuration
    pub fn pyfunc_flavor(&self) -> MlinferResult<PyfuncFlavor> {
        match self.flavors.get(PYFUNC_FLAVOR_NAME) {
            Some(Value::Object(cfg)) if !cfg.is_empty() => Ok(PyfuncFlavor(cfg.clone())),
            _ => Err(MlinferError::UnsupportedFlavor),
        }
    }

    /// Names of every flavor the model was saved with
    pub fn flavor_names(&self) -> Vec<&str> {
        self.flavors.keys().map(String::as_str).collect()
    }

    /// The full descriptor as a JSON object
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// The `python_function` sub-mapping of a descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PyfuncFlavor(Map<String, Value>);

impl PyfuncFlavor {
    /// Conda environment file, relative to the model root.
    ///
    /// Older models store the file name directly under `env`, newer ones store
    /// a mapping keyed by environment manager.
    pub fn conda_env(&self) -> Option<&str> {
        match self.0.get(ENV_KEY)? {
            Value::String(file) if !file.is_empty() => Some(file),
            Value::Object(envs) => envs.get("conda").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Python module used to load the model
    pub fn loader_module(&self) -> Option<&str> {
        self.0.get("loader_module").and_then(Value::as_str)
    }

    /// Python version the model was saved with
    pub fn python_version(&self) -> Option<&str> {
        self.0.get("python_version").and_then(Value::as_str)
    }

    /// Raw configuration mapping
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}
