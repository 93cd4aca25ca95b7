//! Library for the OOM terminator
//!
//! This crate provides the core functionality for:
//! - Resolving candidate pods from namespaces, services and deployments
//! - Sampling pod memory usage against the declared limit
//! - Tracking over-limit streaks and deciding when to terminate a pod
//! - The control loop issuing graceful deletes
//! - Health checks and observability

pub mod cluster;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod resolver;
pub mod sampler;
pub mod terminator;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use cluster::{ClusterApi, KubeClusterApi};
pub use error::{Result, TerminatorError};
pub use health::{ComponentStatus, HealthResponse, LoopHealth, ReadinessResponse};
pub use models::*;
pub use observability::{StructuredLogger, TerminatorMetrics};
pub use terminator::{IterationReport, TerminatorConfig, TerminatorLoop, TerminatorLoopBuilder};
pub use tracker::{Decision, OverageRecord, OverageTracker};
