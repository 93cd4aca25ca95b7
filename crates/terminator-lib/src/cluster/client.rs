//! [`ClusterApi`] backed by a `kube` client

use super::{async_trait, ClusterApi};
use crate::error::{Result, TerminatorError};
use crate::models::PodMetrics;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource};
use std::path::Path;
use tracing::{debug, info};

/// Talks to a real cluster through `kube`
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from a kubeconfig file, or from the in-cluster
    /// service account when no file is given.
    ///
    /// # Errors
    ///
    /// - [`TerminatorError::Kubeconfig`] if the file cannot be read or parsed
    /// - [`TerminatorError::InCluster`] if the in-cluster environment is missing
    /// - [`TerminatorError::Kube`] if the client cannot be built from the config
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        let config = match kubeconfig {
            Some(path) => {
                let kubeconfig =
                    Kubeconfig::read_from(path).map_err(|e| TerminatorError::Kubeconfig {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    })?;

                info!(path = %path.display(), "Using kubeconfig file");
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| TerminatorError::Kubeconfig {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    })?
            }
            None => {
                info!("Using in-cluster configuration");
                Config::incluster().map_err(|e| TerminatorError::InCluster(e.to_string()))?
            }
        };

        let client = Client::try_from(config)?;
        Ok(Self::new(client))
    }

    fn scoped<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::default_namespaced(self.client.clone()),
        }
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_pods(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Pod>> {
        let api: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        if let Some(limit) = limit {
            params = params.limit(limit);
        }

        let pods = api.list(&params).await?;
        Ok(pods.items)
    }

    async fn get_service(&self, namespace: Option<&str>, name: &str) -> Result<Option<Service>> {
        Ok(self.scoped::<Service>(namespace).get_opt(name).await?)
    }

    async fn get_deployment(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Deployment>> {
        Ok(self.scoped::<Deployment>(namespace).get_opt(name).await?)
    }

    async fn get_pod_metrics(&self, namespace: &str, name: &str) -> Result<Option<PodMetrics>> {
        let api: Api<PodMetrics> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_seconds: Option<u32>,
    ) -> Result<()> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = DeleteParams {
            grace_period_seconds,
            ..DeleteParams::default()
        };

        api.delete(name, &params).await?;
        debug!(pod_name = %name, namespace = %namespace, grace_period_seconds = ?grace_period_seconds, "Delete request accepted");
        Ok(())
    }
}
