//! Access to the Kubernetes control plane and metrics API
//!
//! Everything the terminator reads from or writes to the cluster goes
//! through [`ClusterApi`]. A "not found" answer is reported as `Ok(None)`,
//! every other failure as an error, so callers can skip missing objects
//! without inspecting status codes.

mod client;

pub use client::KubeClusterApi;

use crate::error::Result;
use crate::models::PodMetrics;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};

pub use async_trait::async_trait;

/// Cluster operations used by the resolver, the sampler and the loop
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List pods, optionally filtered by a label selector and capped at `limit`.
    ///
    /// `namespace = None` lists across all namespaces.
    async fn list_pods(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Pod>>;

    /// Look up a service. `namespace = None` uses the client's default namespace.
    async fn get_service(&self, namespace: Option<&str>, name: &str) -> Result<Option<Service>>;

    /// Look up a deployment. `namespace = None` uses the client's default namespace.
    async fn get_deployment(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Deployment>>;

    /// Current usage for a pod. `None` while the pod is not reporting metrics yet.
    async fn get_pod_metrics(&self, namespace: &str, name: &str) -> Result<Option<PodMetrics>>;

    /// Delete a pod, passing `grace_period_seconds` through when set
    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_seconds: Option<u32>,
    ) -> Result<()>;
}
