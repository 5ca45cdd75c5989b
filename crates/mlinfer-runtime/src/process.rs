//! Process-based runtime implementation
//!
//! This runtime manages scoring workers as direct OS processes running
//! `mlflow models serve`. Each worker gets its own process group so the
//! whole tree (mlflow and the web server it execs) can be stopped together.

use async_trait::async_trait;
use mlinfer_core::{MlinferError, MlinferResult, RuntimeConfig, Worker, WorkerStatus};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::traits::Runtime;

/// How long a worker gets to exit after SIGTERM before it is killed
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Process-based runtime configuration
#[derive(Debug, Clone)]
pub struct ProcessRuntimeConfig {
    /// Path to the mlflow executable
    pub mlflow_path: PathBuf,
    /// Environment manager used to restore the model's dependencies
    pub env_manager: String,
    /// Additional arguments for `mlflow models serve`
    pub extra_args: Vec<String>,
}

impl Default for ProcessRuntimeConfig {
    fn default() -> Self {
        Self {
            mlflow_path: PathBuf::from("mlflow"),
            env_manager: "local".to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl From<&RuntimeConfig> for ProcessRuntimeConfig {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            mlflow_path: config.mlflow_path.clone(),
            env_manager: config.env_manager.clone(),
            extra_args: Vec::new(),
        }
    }
}

/// Process-based runtime for managing scoring workers.
///
/// Dropping the runtime kills the process group of every worker that was
/// not stopped.
pub struct ProcessRuntime {
    config: ProcessRuntimeConfig,
    children: Mutex<HashMap<Uuid, Child>>,
    grace_period: Duration,
}

impl ProcessRuntime {
    /// Create a new process runtime
    pub fn new(config: ProcessRuntimeConfig) -> Self {
        Self {
            config,
            children: Mutex::new(HashMap::new()),
            grace_period: STOP_GRACE_PERIOD,
        }
    }

    /// Set how long stopped workers get to exit before they are killed
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Build the command to start a worker
    fn build_command(&self, worker: &Worker, model_path: &Path) -> Command {
        let mut cmd = std::process::Command::new(&self.config.mlflow_path);

        cmd.arg("models").arg("serve");
        cmd.arg("-m").arg(model_path);
        cmd.arg("-h").arg(&worker.endpoint.host);
        cmd.arg("-p").arg(worker.endpoint.port.to_string());
        cmd.arg("--env-manager").arg(&self.config.env_manager);

        for arg in &self.config.extra_args {
            cmd.arg(arg);
        }

        // Worker output goes straight to ours
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut cmd = Command::from(cmd);
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Runtime for ProcessRuntime {
    async fn start_worker(&self, worker: &mut Worker, model_path: &Path) -> MlinferResult<()> {
        info!(
            worker_id = %worker.id,
            port = worker.endpoint.port,
            "Starting worker process"
        );

        worker.status = WorkerStatus::Starting;

        let mut cmd = self.build_command(worker, model_path);

        match cmd.spawn() {
            Ok(child) => {
                let pid = child.id();
                worker.pid = pid;
                self.children.lock().await.insert(worker.id, child);

                debug!(
                    worker_id = %worker.id,
                    pid = ?pid,
                    "Worker process spawned"
                );

                // Running is only set once the health check passes
                Ok(())
            }
            Err(e) => {
                error!(
                    worker_id = %worker.id,
                    error = %e,
                    "Failed to spawn worker process"
                );
                worker.status = WorkerStatus::Error;
                Err(MlinferError::Runtime(format!(
                    "Failed to spawn {}: {}",
                    self.config.mlflow_path.display(),
                    e
                )))
            }
        }
    }

    async fn stop_worker(&self, worker: &mut Worker) -> MlinferResult<()> {
        let Some(mut child) = self.children.lock().await.remove(&worker.id) else {
            return Err(MlinferError::Runtime(format!(
                "Worker {} has no process",
                worker.id
            )));
        };

        info!(
            worker_id = %worker.id,
            pid = ?worker.pid,
            "Stopping worker process"
        );

        signal_group(worker.pid, "TERM");

        match tokio::time::timeout(self.grace_period, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(worker_id = %worker.id, status = %status, "Worker exited");
            }
            _ => {
                warn!(worker_id = %worker.id, "Worker did not exit in time, killing");
                signal_group(worker.pid, "KILL");
                child.kill().await?;
            }
        }

        worker.status = WorkerStatus::Terminated;
        Ok(())
    }

    async fn is_running(&self, worker: &Worker) -> MlinferResult<bool> {
        let mut children = self.children.lock().await;
        match children.get_mut(&worker.id) {
            Some(child) => Ok(child.try_wait()?.is_none()),
            None => Ok(false),
        }
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

impl Drop for ProcessRuntime {
    fn drop(&mut self) {
        for (worker_id, child) in self.children.get_mut().iter() {
            if let Some(pid) = child.id() {
                warn!(worker_id = %worker_id, pid = pid, "Killing orphaned worker");
                signal_group(Some(pid), "KILL");
            }
        }
    }
}

/// Send `signal` to a worker's process group
fn signal_group(pid: Option<u32>, signal: &str) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            let _ = std::process::Command::new("kill")
                .arg(format!("-{}", signal))
                .arg("--")
                .arg(format!("-{}", pid))
                .output();
        }
    }

    #[cfg(not(unix))]
    let _ = (pid, signal);
}
