//! Health checking for workers

use chrono::Utc;
use mlinfer_core::{Endpoint, MlinferError, MlinferResult, Worker, WorkerStatus};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Health route exposed by the mlflow scoring server
pub const WORKER_HEALTH_PATH: &str = "/ping";

/// Health checker for workers
pub struct HealthChecker {
    /// HTTP client for health checks
    client: reqwest::Client,
    /// Health check path
    health_path: String,
    /// Timeout duration
    timeout: Duration,
}

impl HealthChecker {
    /// Create a new health checker
    pub fn new(health_path: String, timeout_secs: u64) -> MlinferResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| MlinferError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            health_path,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Check the health of an endpoint
    pub async fn check(&self, endpoint: &Endpoint) -> bool {
        let url = format!("{}{}", endpoint.url(), self.health_path);

        match self.client.get(&url).send().await {
            Ok(response) => {
                let healthy = response.status().is_success();
                if healthy {
                    debug!(endpoint = %url, "Health check passed");
                } else {
                    warn!(
                        endpoint = %url,
                        status = %response.status(),
                        "Health check failed"
                    );
                }
                healthy
            }
            Err(e) => {
                debug!(
                    endpoint = %url,
                    error = %e,
                    "Health check error"
                );
                false
            }
        }
    }

    /// Check a worker and record the outcome on it
    pub async fn probe(&self, worker: &mut Worker) -> bool {
        let healthy = self.check(&worker.endpoint).await;
        record_health(worker, healthy);
        healthy
    }

    /// Poll an endpoint every `interval` until it passes a health check.
    ///
    /// Fails with a `Runtime` error once `timeout` has elapsed.
    pub async fn wait_ready(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
        interval: Duration,
    ) -> MlinferResult<()> {
        let deadline = Instant::now() + timeout;

        loop {
            if self.check(endpoint).await {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(MlinferError::Runtime(format!(
                    "{} not healthy after {}s",
                    endpoint.url(),
                    timeout.as_secs()
                )));
            }

            tokio::time::sleep(interval).await;
        }
    }

    /// Get the timeout duration
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Record a health check outcome on a worker
pub fn record_health(worker: &mut Worker, healthy: bool) {
    if healthy {
        worker.status = WorkerStatus::Running;
        worker.last_health_check = Some(Utc::now());
    } else if worker.status == WorkerStatus::Running {
        worker.status = WorkerStatus::Unhealthy;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};

    async fn spawn_ping_server() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        serve_ping(listener);
        port
    }

    fn serve_ping(listener: tokio::net::TcpListener) {
        let router = Router::new().route(WORKER_HEALTH_PATH, get(|| async { "\n" }));
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
    }

    async fn unused_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_health_checker_creation() {
        let checker = HealthChecker::new(WORKER_HEALTH_PATH.to_string(), 10).unwrap();
        assert_eq!(checker.timeout(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_probe_marks_worker_running() {
        let port = spawn_ping_server().await;
        let checker = HealthChecker::new(WORKER_HEALTH_PATH.to_string(), 5).unwrap();
        let mut worker = Worker::new(0, "127.0.0.1", port);

        assert!(checker.probe(&mut worker).await);
        assert_eq!(worker.status, WorkerStatus::Running);
        assert!(worker.last_health_check.is_some());
    }

    #[tokio::test]
    async fn test_probe_unreachable_worker() {
        let port = unused_port().await;
        let checker = HealthChecker::new(WORKER_HEALTH_PATH.to_string(), 1).unwrap();
        let mut worker = Worker::new(0, "127.0.0.1", port);

        assert!(!checker.probe(&mut worker).await);
        assert_eq!(worker.status, WorkerStatus::Pending);

        worker.status = WorkerStatus::Running;
        assert!(!checker.probe(&mut worker).await);
        assert_eq!(worker.status, WorkerStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_wait_ready_for_late_worker() {
        let port = unused_port().await;
        let checker = HealthChecker::new(WORKER_HEALTH_PATH.to_string(), 1).unwrap();
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port,
            tls: false,
        };

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
            serve_ping(listener);
        });

        checker
            .wait_ready(&endpoint, Duration::from_secs(10), Duration::from_millis(50))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_ready_times_out() {
        let port = unused_port().await;
        let checker = HealthChecker::new(WORKER_HEALTH_PATH.to_string(), 1).unwrap();
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port,
            tls: false,
        };

        let result = checker
            .wait_ready(&endpoint, Duration::from_millis(200), Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(MlinferError::Runtime(_))));
    }

    #[test]
    fn test_record_health() {
        let mut worker = Worker::new(0, "127.0.0.1", 30000);
        record_health(&mut worker, false);
        assert_eq!(worker.status, WorkerStatus::Pending);

        record_health(&mut worker, true);
        assert_eq!(worker.status, WorkerStatus::Running);
        assert!(worker.last_health_check.is_some());
    }
}
