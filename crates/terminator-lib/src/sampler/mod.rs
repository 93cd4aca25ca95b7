//! Memory usage sampling
//!
//! Reads the current memory usage of a pod's primary container from the
//! metrics API and relates it to the container's declared memory limit.
//! Only the first container of a pod is evaluated.

mod quantity;

pub use quantity::{parse_bytes, InvalidQuantity};

use crate::cluster::ClusterApi;
use crate::error::Result;
use crate::models::{container_count, is_running, pod_name, pod_namespace, UsageSample};
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resource name of memory in limits and usage maps
const MEMORY: &str = "memory";

/// Samples pod memory utilization
pub struct MetricSampler {
    api: Arc<dyn ClusterApi>,
}

impl MetricSampler {
    pub fn new(api: Arc<dyn ClusterApi>) -> Self {
        Self { api }
    }

    /// Sample a pod.
    ///
    /// Returns `Ok(None)` when the pod cannot be evaluated this iteration:
    /// no containers, not running, no metrics yet, or no usable memory limit.
    /// Only API failures other than "not found" are errors.
    pub async fn sample(&self, pod: &Pod) -> Result<Option<UsageSample>> {
        let name = pod_name(pod);
        let namespace = pod_namespace(pod);

        if container_count(pod) == 0 || !is_running(pod) {
            return Ok(None);
        }

        let Some(limit_bytes) = memory_limit(pod) else {
            debug!(pod_name = %name, "Pod has no memory limit, skipping");
            return Ok(None);
        };

        let Some(metrics) = self.api.get_pod_metrics(namespace, name).await? else {
            debug!(pod_name = %name, "Pod has no metrics");
            return Ok(None);
        };

        let Some(container) = metrics.containers.first() else {
            return Ok(None);
        };

        let Some(usage) = container.usage.get(MEMORY) else {
            debug!(pod_name = %name, container = %container.name, "Container reports no memory usage");
            return Ok(None);
        };

        let usage_bytes = match parse_bytes(&usage.0) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(pod_name = %name, error = %e, "Unreadable memory usage, skipping");
                return Ok(None);
            }
        };

        Ok(Some(UsageSample::new(name, namespace, usage_bytes, limit_bytes)))
    }
}

/// Memory limit of the first container in bytes, `None` if unset, zero or unreadable
fn memory_limit(pod: &Pod) -> Option<u64> {
    let quantity = pod
        .spec
        .as_ref()?
        .containers
        .first()?
        .resources
        .as_ref()?
        .limits
        .as_ref()?
        .get(MEMORY)?;

    match parse_bytes(&quantity.0) {
        Ok(0) => None,
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(pod_name = %pod_name(pod), error = %e, "Unreadable memory limit");
            None
        }
    }
}
