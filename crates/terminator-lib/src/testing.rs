//! In-memory cluster used by the unit tests

use crate::cluster::{async_trait, ClusterApi};
use crate::error::{Result, TerminatorError};
use crate::models::{ContainerMetrics, PodMetrics};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, Pod, PodSpec, PodStatus, ResourceRequirements, Service, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Records every delete request it receives
#[derive(Default)]
pub struct FakeCluster {
    pub pods: Mutex<Vec<Pod>>,
    pub services: Mutex<Vec<Service>>,
    pub deployments: Mutex<Vec<Deployment>>,
    /// pod name -> memory usage quantity of its first container
    pub usage: Mutex<BTreeMap<String, String>>,
    pub deleted: Mutex<Vec<(String, String, Option<u32>)>>,
    pub list_calls: Mutex<Vec<(Option<String>, Option<String>, Option<u32>)>>,
    /// pod name -> metrics returned instead of the ones built from `usage`
    pub metrics: Mutex<BTreeMap<String, PodMetrics>>,
    /// When set, every call fails with this message
    pub fail_with: Mutex<Option<String>>,
    /// When set, only deletes fail with this message
    pub fail_deletes_with: Mutex<Option<String>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pod(&self, pod: Pod) {
        self.pods.lock().unwrap().push(pod);
    }

    pub fn add_service(&self, service: Service) {
        self.services.lock().unwrap().push(service);
    }

    pub fn add_deployment(&self, deployment: Deployment) {
        self.deployments.lock().unwrap().push(deployment);
    }

    pub fn set_usage(&self, pod: &str, quantity: &str) {
        self.usage
            .lock()
            .unwrap()
            .insert(pod.to_string(), quantity.to_string());
    }

    pub fn set_metrics(&self, pod: &str, metrics: PodMetrics) {
        self.metrics
            .lock()
            .unwrap()
            .insert(pod.to_string(), metrics);
    }

    pub fn fail(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_delete(&self, message: &str) {
        *self.fail_deletes_with.lock().unwrap() = Some(message.to_string());
    }

    pub fn deleted_names(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap()
            .iter()
            .map(|(_, name, _)| name.clone())
            .collect()
    }

    fn check_failure(&self) -> Result<()> {
        match self.fail_with.lock().unwrap().as_ref() {
            Some(message) => Err(api_error(message)),
            None => Ok(()),
        }
    }
}

fn api_error(message: &str) -> TerminatorError {
    TerminatorError::Kube(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

fn matches_selector(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    selector.split(',').filter(|s| !s.is_empty()).all(|term| {
        let Some((key, value)) = term.split_once('=') else {
            return false;
        };
        labels.and_then(|l| l.get(key)).map(String::as_str) == Some(value)
    })
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_pods(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Pod>> {
        self.check_failure()?;
        self.list_calls.lock().unwrap().push((
            namespace.map(String::from),
            label_selector.map(String::from),
            limit,
        ));

        let pods = self.pods.lock().unwrap();
        let matching = pods
            .iter()
            .filter(|p| namespace.map_or(true, |ns| p.metadata.namespace.as_deref() == Some(ns)))
            .filter(|p| {
                label_selector.map_or(true, |sel| matches_selector(p.metadata.labels.as_ref(), sel))
            })
            .take(limit.map_or(usize::MAX, |l| l as usize))
            .cloned()
            .collect();
        Ok(matching)
    }

    async fn get_service(&self, namespace: Option<&str>, name: &str) -> Result<Option<Service>> {
        self.check_failure()?;
        let ns = namespace.unwrap_or("default");
        Ok(self
            .services
            .lock()
            .unwrap()
            .iter()
            .find(|s| {
                s.metadata.name.as_deref() == Some(name) && s.metadata.namespace.as_deref() == Some(ns)
            })
            .cloned())
    }

    async fn get_deployment(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Deployment>> {
        self.check_failure()?;
        let ns = namespace.unwrap_or("default");
        Ok(self
            .deployments
            .lock()
            .unwrap()
            .iter()
            .find(|d| {
                d.metadata.name.as_deref() == Some(name) && d.metadata.namespace.as_deref() == Some(ns)
            })
            .cloned())
    }

    async fn get_pod_metrics(&self, namespace: &str, name: &str) -> Result<Option<PodMetrics>> {
        self.check_failure()?;
        if let Some(metrics) = self.metrics.lock().unwrap().get(name) {
            return Ok(Some(metrics.clone()));
        }
        let usage = self.usage.lock().unwrap();
        Ok(usage.get(name).map(|quantity| PodMetrics {
            metadata: meta(name, namespace, BTreeMap::new()),
            containers: vec![ContainerMetrics {
                name: "app".to_string(),
                usage: BTreeMap::from([("memory".to_string(), Quantity(quantity.clone()))]),
            }],
            ..PodMetrics::default()
        }))
    }

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_seconds: Option<u32>,
    ) -> Result<()> {
        self.check_failure()?;
        if let Some(message) = self.fail_deletes_with.lock().unwrap().as_ref() {
            return Err(api_error(message));
        }
        self.deleted.lock().unwrap().push((
            namespace.to_string(),
            name.to_string(),
            grace_period_seconds,
        ));
        Ok(())
    }
}

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn meta(name: &str, namespace: &str, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(labels),
        ..ObjectMeta::default()
    }
}

/// A running single-container pod with the given memory limit
pub fn pod(name: &str, namespace: &str, memory_limit: &str, pod_labels: &[(&str, &str)]) -> Pod {
    let container = Container {
        name: "app".to_string(),
        resources: Some(ResourceRequirements {
            limits: Some(BTreeMap::from([(
                "memory".to_string(),
                Quantity(memory_limit.to_string()),
            )])),
            ..ResourceRequirements::default()
        }),
        ..Container::default()
    };

    Pod {
        metadata: meta(name, namespace, labels(pod_labels)),
        spec: Some(PodSpec {
            containers: vec![container],
            ..PodSpec::default()
        }),
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            ..PodStatus::default()
        }),
    }
}

pub fn with_phase(mut pod: Pod, phase: &str) -> Pod {
    pod.status = Some(PodStatus {
        phase: Some(phase.to_string()),
        ..PodStatus::default()
    });
    pod
}

pub fn service(name: &str, namespace: &str, selector: &[(&str, &str)]) -> Service {
    Service {
        metadata: meta(name, namespace, BTreeMap::new()),
        spec: Some(ServiceSpec {
            selector: Some(labels(selector)),
            ..ServiceSpec::default()
        }),
        status: None,
    }
}

pub fn deployment(
    name: &str,
    namespace: &str,
    replicas: i32,
    selector: &[(&str, &str)],
) -> Deployment {
    Deployment {
        metadata: meta(name, namespace, BTreeMap::new()),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels(selector)),
                match_expressions: None,
            },
            ..DeploymentSpec::default()
        }),
        status: None,
    }
}
