//! Pod discovery
//!
//! Resolves the candidate pod set for one loop iteration, either as a
//! bounded page of every pod in scope or as the union of the pods behind the
//! requested services and deployments.

mod selector;

pub use selector::{deployment_selector, render_label_selector, service_selector};

use crate::cluster::ClusterApi;
use crate::error::Result;
use crate::models::is_running;
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default cap on the unfiltered pod listing
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Which pods to consider
#[derive(Debug, Clone, PartialEq)]
pub struct PodFilter {
    /// `None` means all namespaces (unfiltered) or the client's default
    /// namespace (service/deployment lookups)
    pub namespace: Option<String>,
    pub services: Vec<String>,
    pub deployments: Vec<String>,
    pub page_limit: u32,
}

impl Default for PodFilter {
    fn default() -> Self {
        Self {
            namespace: None,
            services: Vec::new(),
            deployments: Vec::new(),
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl PodFilter {
    /// Whether neither services nor deployments were requested
    pub fn is_unfiltered(&self) -> bool {
        self.services.is_empty() && self.deployments.is_empty()
    }
}

/// Produces the candidate pods for an iteration
pub struct PodResolver {
    api: Arc<dyn ClusterApi>,
    filter: PodFilter,
}

impl PodResolver {
    pub fn new(api: Arc<dyn ClusterApi>, filter: PodFilter) -> Self {
        Self { api, filter }
    }

    pub fn filter(&self) -> &PodFilter {
        &self.filter
    }

    /// Resolve the current pod set.
    ///
    /// Pods matched by more than one filter appear more than once.
    pub async fn resolve(&self) -> Result<Vec<Pod>> {
        let namespace = self.filter.namespace.as_deref();

        if self.filter.is_unfiltered() {
            return self
                .api
                .list_pods(namespace, None, Some(self.filter.page_limit))
                .await;
        }

        let mut pods = Vec::new();

        for name in &self.filter.services {
            pods.extend(self.service_pods(namespace, name).await?);
        }

        for name in &self.filter.deployments {
            pods.extend(self.deployment_pods(namespace, name).await?);
        }

        Ok(pods)
    }

    async fn service_pods(&self, namespace: Option<&str>, name: &str) -> Result<Vec<Pod>> {
        let Some(service) = self.api.get_service(namespace, name).await? else {
            warn!(service = %name, "Service not found, skipping");
            return Ok(Vec::new());
        };

        let Some(selector) = service_selector(&service) else {
            warn!(service = %name, "Service has no pod selector, skipping");
            return Ok(Vec::new());
        };

        let pods_namespace = service.metadata.namespace.as_deref().or(namespace);
        let pods = self
            .api
            .list_pods(pods_namespace, Some(&selector), None)
            .await?;

        info!(service = %name, selector = %selector, pods = pods.len(), "Resolved service pods");
        Ok(pods)
    }

    async fn deployment_pods(&self, namespace: Option<&str>, name: &str) -> Result<Vec<Pod>> {
        let Some(deployment) = self.api.get_deployment(namespace, name).await? else {
            warn!(deployment = %name, "Deployment not found, skipping");
            return Ok(Vec::new());
        };

        let Some(selector) = deployment_selector(&deployment)? else {
            warn!(deployment = %name, "Deployment has no pod selector, skipping");
            return Ok(Vec::new());
        };

        let pods_namespace = deployment.metadata.namespace.as_deref().or(namespace);
        let pods = self
            .api
            .list_pods(pods_namespace, Some(&selector), None)
            .await?;

        // Unset replicas defaults to 1 on the API server
        let desired = deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1);
        let running = pods.iter().filter(|p| is_running(p)).count();

        if is_stable(running, desired) {
            info!(deployment = %name, pods = pods.len(), "Resolved deployment pods");
            Ok(pods)
        } else {
            debug!(
                deployment = %name,
                running = running,
                desired = desired,
                "Skipping deployment, not all pods are running"
            );
            Ok(Vec::new())
        }
    }
}

/// A deployment is evaluated only once it runs at least its desired replicas
fn is_stable(running: usize, desired: i32) -> bool {
    i64::try_from(running).unwrap_or(i64::MAX) >= i64::from(desired)
}
