//! Load balancing strategies

use mlinfer_core::{Endpoint, LoadBalanceStrategy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;

/// Load balancer for distributing predictions across workers
pub struct LoadBalancer {
    /// Load balancing strategy
    strategy: LoadBalanceStrategy,
    /// Counter for round-robin
    counter: AtomicUsize,
}

impl LoadBalancer {
    /// Create a new load balancer
    pub fn new(strategy: LoadBalanceStrategy) -> Self {
        Self {
            strategy,
            counter: AtomicUsize::new(0),
        }
    }

    /// Select an endpoint from the list
    pub fn select<'a>(&self, endpoints: &'a [Endpoint]) -> Option<&'a Endpoint> {
        if endpoints.is_empty() {
            return None;
        }

        let index = match self.strategy {
            LoadBalanceStrategy::RoundRobin => {
                self.counter.fetch_add(1, Ordering::Relaxed) % endpoints.len()
            }
            LoadBalanceStrategy::Random => {
                let seed = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.subsec_nanos() as usize)
                    .unwrap_or_default();
                seed % endpoints.len()
            }
        };

        trace!(
            strategy = ?self.strategy,
            selected_index = index,
            total_endpoints = endpoints.len(),
            "Selected endpoint"
        );

        endpoints.get(index)
    }

    /// Get the current strategy
    pub fn strategy(&self) -> LoadBalanceStrategy {
        self.strategy
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new(LoadBalanceStrategy::RoundRobin)
    }
}
