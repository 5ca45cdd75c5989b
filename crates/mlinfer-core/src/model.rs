//! Worker and Endpoint type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Worker represents a running pyfunc scoring process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    /// Unique worker identifier
    pub id: Uuid,
    /// Worker index within the server
    pub index: u32,
    /// Current status
    pub status: WorkerStatus,
    /// Network endpoint
    pub endpoint: Endpoint,
    /// Process ID
    pub pid: Option<u32>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last successful health check
    pub last_health_check: Option<DateTime<Utc>>,
}

impl Worker {
    /// Create a new worker
    pub fn new(index: u32, host: &str, port: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            index,
            status: WorkerStatus::Pending,
            endpoint: Endpoint::new(host.to_string(), port),
            pid: None,
            created_at: Utc::now(),
            last_health_check: None,
        }
    }

    /// Check if the worker is healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self.status, WorkerStatus::Running)
    }
}

/// Worker status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Worker is being created
    Pending,
    /// Process spawned, health check not yet passed
    Starting,
    /// Worker is running and healthy
    Running,
    /// Worker stopped answering health checks
    Unhealthy,
    /// Worker has terminated
    Terminated,
    /// Worker encountered an error
    Error,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerStatus::Pending => write!(f, "Pending"),
            WorkerStatus::Starting => write!(f, "Starting"),
            WorkerStatus::Running => write!(f, "Running"),
            WorkerStatus::Unhealthy => write!(f, "Unhealthy"),
            WorkerStatus::Terminated => write!(f, "Terminated"),
            WorkerStatus::Error => write!(f, "Error"),
        }
    }
}

/// Network endpoint for a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Whether TLS is enabled
    pub tls: bool,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            tls: false,
        }
    }

    /// Get the URL for this endpoint
    pub fn url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}
