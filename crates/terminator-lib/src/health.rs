//! Health tracking for the terminator loop
//!
//! The loop records a heartbeat after every completed iteration. Liveness
//! fails once the heartbeat is older than the configured staleness bound;
//! readiness requires the loop to be started and to have completed at least
//! one iteration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Health status of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Unhealthy,
}

/// Liveness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_iteration_timestamp: Option<i64>,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Heartbeat shared between the loop and the health endpoints
#[derive(Debug, Clone)]
pub struct LoopHealth {
    last_iteration: Arc<RwLock<Option<DateTime<Utc>>>>,
    ready: Arc<RwLock<bool>>,
    stale_after: Duration,
}

impl LoopHealth {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            last_iteration: Arc::new(RwLock::new(None)),
            ready: Arc::new(RwLock::new(false)),
            stale_after,
        }
    }

    /// Record a completed iteration
    pub async fn record_iteration(&self) {
        self.record_iteration_at(Utc::now()).await;
    }

    pub async fn record_iteration_at(&self, at: DateTime<Utc>) {
        *self.last_iteration.write().await = Some(at);
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        self.health_at(Utc::now()).await
    }

    /// Liveness as seen at `now`
    pub async fn health_at(&self, now: DateTime<Utc>) -> HealthResponse {
        let last = *self.last_iteration.read().await;

        let stale = last.is_some_and(|at| {
            (now - at)
                .to_std()
                .map(|elapsed| elapsed > self.stale_after)
                .unwrap_or(false)
        });

        if stale {
            HealthResponse {
                status: ComponentStatus::Unhealthy,
                message: Some(format!(
                    "No completed iteration for more than {}s",
                    self.stale_after.as_secs()
                )),
                last_iteration_timestamp: last.map(|at| at.timestamp()),
            }
        } else {
            HealthResponse {
                status: ComponentStatus::Healthy,
                message: None,
                last_iteration_timestamp: last.map(|at| at.timestamp()),
            }
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read().await {
            return ReadinessResponse {
                ready: false,
                reason: Some("Terminator not yet started".to_string()),
            };
        }

        if self.last_iteration.read().await.is_none() {
            return ReadinessResponse {
                ready: false,
                reason: Some("No iteration completed yet".to_string()),
            };
        }

        ReadinessResponse {
            ready: true,
            reason: None,
        }
    }
}
