//! Error types for the terminator library

use thiserror::Error;

/// Errors that stop the terminator loop.
///
/// "Not found" answers from the cluster are never represented here: the
/// [`ClusterApi`](crate::cluster::ClusterApi) seam turns them into `None`.
#[derive(Debug, Error)]
pub enum TerminatorError {
    #[error("Kubernetes API request failed: {0}")]
    Kube(#[from] kube::Error),

    #[error("Failed to load kubeconfig from {path}: {message}")]
    Kubeconfig { path: String, message: String },

    #[error("Failed to load in-cluster configuration: {0}")]
    InCluster(String),

    #[error("Unsupported label selector operator {operator:?} on key {key}")]
    UnsupportedSelectorOperator { key: String, operator: String },

    #[error("{0} is required")]
    MissingComponent(&'static str),
}

pub type Result<T, E = TerminatorError> = std::result::Result<T, E>;
