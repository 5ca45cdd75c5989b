//! mlinfer-network: Worker networking
//!
//! This crate provides networking between the server and its scoring workers:
//! - Health checking while workers start and while they serve
//! - Load balancing of predictions across workers

pub mod balancer;
pub mod health;

pub use balancer::LoadBalancer;
pub use health::{record_health, HealthChecker};
