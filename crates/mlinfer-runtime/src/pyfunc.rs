//! Pyfunc model backed by mlflow scoring workers
//!
//! Loading resolves the model, checks its descriptor, starts the configured
//! number of workers and waits for each to answer its health check.
//! Predictions are forwarded to one worker per request.

use async_trait::async_trait;
use futures::future::try_join_all;
use mlinfer_core::{
    Endpoint, MlinferError, MlinferResult, ModelDescriptor, RuntimeConfig, Worker, WorkerStatus,
    MLMODEL_FILE_NAME,
};
use mlinfer_network::health::WORKER_HEALTH_PATH;
use mlinfer_network::{record_health, HealthChecker, LoadBalancer};
use mlinfer_store::{ArtifactStore, ModelUri};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::process::{ProcessRuntime, ProcessRuntimeConfig};
use crate::traits::{Predictor, Row, Runtime};

/// Scoring route of the mlflow scoring server
const INVOCATIONS_PATH: &str = "/invocations";

/// Column name pandas gives a single unnamed prediction column
const SCALAR_COLUMN: &str = "0";

/// A pyfunc model served by one or more scoring workers
pub struct PyfuncModel {
    descriptor: ModelDescriptor,
    model_path: PathBuf,
    runtime: Arc<dyn Runtime>,
    workers: Mutex<Vec<Worker>>,
    endpoints: Vec<Endpoint>,
    balancer: LoadBalancer,
    client: reqwest::Client,
}

impl PyfuncModel {
    /// Resolve `model_uri` and start process workers for it
    pub async fn load(
        model_uri: &str,
        config: &RuntimeConfig,
        request_timeout: Duration,
        store: &ArtifactStore,
    ) -> MlinferResult<Self> {
        let uri = ModelUri::parse(model_uri);
        let model_path = store.download(&uri, None).await?;

        info!(
            model_uri = model_uri,
            path = %model_path.display(),
            "Loading model"
        );

        let runtime = Arc::new(ProcessRuntime::new(ProcessRuntimeConfig::from(config)));
        Self::start(&model_path, runtime, config, request_timeout).await
    }

    /// Start workers for an already local model on the given runtime
    pub async fn start(
        model_path: &Path,
        runtime: Arc<dyn Runtime>,
        config: &RuntimeConfig,
        request_timeout: Duration,
    ) -> MlinferResult<Self> {
        let descriptor = ModelDescriptor::from_file(&model_path.join(MLMODEL_FILE_NAME))?;
        let flavor = descriptor.pyfunc_flavor()?;

        if config.workers == 0 {
            return Err(MlinferError::Config(
                "at least one worker is required".to_string(),
            ));
        }

        info!(
            runtime = runtime.name(),
            loader_module = flavor.loader_module().unwrap_or("unknown"),
            workers = config.workers,
            "Starting scoring workers"
        );

        let mut workers = Vec::with_capacity(config.workers as usize);
        for index in 0..config.workers {
            let port = u16::try_from(index)
                .ok()
                .and_then(|offset| config.worker_base_port.checked_add(offset))
                .ok_or_else(|| {
                    MlinferError::Config(format!(
                        "worker port out of range for {} workers from {}",
                        config.workers, config.worker_base_port
                    ))
                })?;
            workers.push(Worker::new(index, &config.worker_host, port));
        }

        let started = start_all(runtime.as_ref(), &mut workers, model_path, config).await;
        if let Err(e) = started {
            error!(error = %e, "Model failed to load, stopping workers");
            for worker in workers.iter_mut() {
                if runtime.is_running(worker).await.unwrap_or(false) {
                    let _ = runtime.stop_worker(worker).await;
                }
            }
            return Err(e);
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| MlinferError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let endpoints = workers.iter().map(|w| w.endpoint.clone()).collect();

        info!(workers = workers.len(), "Model loaded");

        Ok(Self {
            descriptor,
            model_path: model_path.to_path_buf(),
            runtime,
            workers: Mutex::new(workers),
            endpoints,
            balancer: LoadBalancer::new(config.lb_strategy),
            client,
        })
    }

    /// Local directory the model was loaded from
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Snapshot of the scoring workers
    pub async fn workers(&self) -> Vec<Worker> {
        self.workers.lock().await.clone()
    }

    /// Stop every scoring worker
    pub async fn shutdown(&self) {
        let mut workers = self.workers.lock().await;
        for worker in workers.iter_mut() {
            if let Err(e) = self.runtime.stop_worker(worker).await {
                warn!(worker_id = %worker.id, error = %e, "Failed to stop worker");
            }
        }
    }
}

#[async_trait]
impl Predictor for PyfuncModel {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    async fn predict(&self, rows: Vec<Row>) -> MlinferResult<Vec<Row>> {
        let endpoint = self
            .balancer
            .select(&self.endpoints)
            .ok_or_else(|| MlinferError::ModelNotLoaded("no scoring workers".to_string()))?;

        let url = format!("{}{}", endpoint.url(), INVOCATIONS_PATH);
        let count = rows.len();
        debug!(endpoint = %url, rows = count, "Forwarding prediction");

        let response = self
            .client
            .post(&url)
            .json(&json!({ "dataframe_records": rows }))
            .send()
            .await
            .map_err(|e| MlinferError::Predict(format!("{} unreachable: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MlinferError::Predict(format!(
                "worker returned {}: {}",
                status,
                body.trim()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| MlinferError::Predict(format!("invalid worker response: {}", e)))?;

        let predictions = predictions_to_rows(body)?;
        if predictions.len() != count {
            warn!(
                requested = count,
                returned = predictions.len(),
                "Prediction row count differs from request"
            );
        }
        Ok(predictions)
    }
}

async fn start_all(
    runtime: &dyn Runtime,
    workers: &mut [Worker],
    model_path: &Path,
    config: &RuntimeConfig,
) -> MlinferResult<()> {
    for worker in workers.iter_mut() {
        runtime.start_worker(worker, model_path).await?;
    }

    let checker = HealthChecker::new(WORKER_HEALTH_PATH.to_string(), 5)?;
    let timeout = Duration::from_secs(config.startup_timeout_secs);
    let interval = Duration::from_millis(config.health_check_interval_ms);

    try_join_all(
        workers
            .iter_mut()
            .map(|worker| wait_until_ready(runtime, &checker, worker, timeout, interval)),
    )
    .await?;

    Ok(())
}

/// Wait for a worker's health check to pass, failing early if its process exits
async fn wait_until_ready(
    runtime: &dyn Runtime,
    checker: &HealthChecker,
    worker: &mut Worker,
    timeout: Duration,
    interval: Duration,
) -> MlinferResult<()> {
    let endpoint = worker.endpoint.clone();

    let ready = {
        let exited = wait_for_exit(runtime, worker, interval);
        tokio::select! {
            ready = checker.wait_ready(&endpoint, timeout, interval) => Some(ready),
            exited = exited => {
                exited?;
                None
            }
        }
    };

    match ready {
        Some(Ok(())) => {
            record_health(worker, true);
            info!(
                worker_id = %worker.id,
                endpoint = %endpoint.url(),
                "Worker ready"
            );
            Ok(())
        }
        Some(Err(e)) => {
            worker.status = WorkerStatus::Unhealthy;
            Err(e)
        }
        None => {
            worker.status = WorkerStatus::Error;
            Err(MlinferError::Runtime(format!(
                "worker {} exited before becoming healthy",
                worker.index
            )))
        }
    }
}

/// Resolves once the worker's process is gone
async fn wait_for_exit(
    runtime: &dyn Runtime,
    worker: &Worker,
    interval: Duration,
) -> MlinferResult<()> {
    while runtime.is_running(worker).await? {
        tokio::time::sleep(interval).await;
    }
    Ok(())
}

/// Convert a scoring server response into result rows.
///
/// Accepts `{"predictions": ...}` or a bare payload. Records stay as they
/// are, scalars become single-column rows and column-oriented objects are
/// transposed.
pub fn predictions_to_rows(body: Value) -> MlinferResult<Vec<Row>> {
    let predictions = match body {
        Value::Object(mut map) if map.contains_key("predictions") => map
            .remove("predictions")
            .unwrap_or(Value::Null),
        other => other,
    };

    match predictions {
        Value::Array(items) => Ok(items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => row,
                scalar => Row::from_iter([(SCALAR_COLUMN.to_string(), scalar)]),
            })
            .collect()),
        Value::Object(columns) => transpose_columns(columns),
        other => Err(MlinferError::Predict(format!(
            "unexpected prediction payload: {}",
            other
        ))),
    }
}

fn transpose_columns(columns: Row) -> MlinferResult<Vec<Row>> {
    let mut len = None;
    for (name, values) in &columns {
        let Value::Array(values) = values else {
            return Err(MlinferError::Predict(format!(
                "column '{}' is not an array",
                name
            )));
        };
        match len {
            None => len = Some(values.len()),
            Some(expected) if expected != values.len() => {
                return Err(MlinferError::Predict(format!(
                    "column '{}' has {} values, expected {}",
                    name,
                    values.len(),
                    expected
                )));
            }
            Some(_) => {}
        }
    }

    let mut rows = vec![Row::new(); len.unwrap_or(0)];
    for (name, values) in columns {
        if let Value::Array(values) = values {
            for (row, value) in rows.iter_mut().zip(values) {
                row.insert(name.clone(), value);
            }
        }
    }
    Ok(rows)
}
