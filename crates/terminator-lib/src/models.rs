//! Core data models for the terminator

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Phase a pod must be in to be evaluated
pub const RUNNING_PHASE: &str = "Running";

/// A point-in-time memory reading for the primary container of a pod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSample {
    pub pod_name: String,
    pub namespace: String,
    pub usage_bytes: u64,
    pub limit_bytes: u64,
    /// usage / limit × 100
    pub percentage: f64,
}

impl UsageSample {
    pub fn new(
        pod_name: impl Into<String>,
        namespace: impl Into<String>,
        usage_bytes: u64,
        limit_bytes: u64,
    ) -> Self {
        Self {
            pod_name: pod_name.into(),
            namespace: namespace.into(),
            usage_bytes,
            limit_bytes,
            percentage: usage_percentage(usage_bytes, limit_bytes),
        }
    }
}

/// Memory utilization as a percentage of the limit.
///
/// Multiplies before dividing so that exact ratios (950Mi of 1000Mi) come out
/// exact.
pub fn usage_percentage(usage_bytes: u64, limit_bytes: u64) -> f64 {
    usage_bytes as f64 * 100.0 / limit_bytes as f64
}

/// Pod metrics as served by the `metrics.k8s.io/v1beta1` API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodMetrics {
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    #[serde(default)]
    pub containers: Vec<ContainerMetrics>,
}

/// Usage of a single container inside [`PodMetrics`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerMetrics {
    pub name: String,
    #[serde(default)]
    pub usage: BTreeMap<String, Quantity>,
}

impl k8s_openapi::Resource for PodMetrics {
    const API_VERSION: &'static str = "metrics.k8s.io/v1beta1";
    const GROUP: &'static str = "metrics.k8s.io";
    const KIND: &'static str = "PodMetrics";
    const VERSION: &'static str = "v1beta1";
    const URL_PATH_SEGMENT: &'static str = "pods";
    type Scope = k8s_openapi::NamespaceResourceScope;
}

impl k8s_openapi::Metadata for PodMetrics {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}

/// Name of a pod, empty if unset
pub fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}

/// Namespace of a pod, empty if unset
pub fn pod_namespace(pod: &Pod) -> &str {
    pod.metadata.namespace.as_deref().unwrap_or_default()
}

/// Whether the pod reports the `Running` phase
pub fn is_running(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(|phase| phase == RUNNING_PHASE)
        .unwrap_or(false)
}

/// Number of containers declared in the pod spec
pub fn container_count(pod: &Pod) -> usize {
    pod.spec.as_ref().map(|s| s.containers.len()).unwrap_or(0)
}
