//! Runtime and model trait definitions

use async_trait::async_trait;
use mlinfer_core::{MlinferResult, ModelDescriptor, Worker};
use serde_json::{Map, Value};
use std::path::Path;

/// One record of a prediction request or response, column name to value
pub type Row = Map<String, Value>;

/// Runtime trait for managing scoring workers
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Start a new worker serving the model at `model_path`
    async fn start_worker(&self, worker: &mut Worker, model_path: &Path) -> MlinferResult<()>;

    /// Stop a running worker
    async fn stop_worker(&self, worker: &mut Worker) -> MlinferResult<()>;

    /// Check if a worker process is still alive
    async fn is_running(&self, worker: &Worker) -> MlinferResult<bool>;

    /// Get the runtime name
    fn name(&self) -> &'static str;
}

/// A loaded model that can score row-oriented records
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Descriptor the model was loaded from
    fn descriptor(&self) -> &ModelDescriptor;

    /// Score a batch of rows, returning one result row per input row
    async fn predict(&self, rows: Vec<Row>) -> MlinferResult<Vec<Row>>;
}
