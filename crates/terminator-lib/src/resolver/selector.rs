//! Label selector rendering
//!
//! Turns service and deployment selectors into the string form accepted by
//! the `labelSelector` list parameter.

use crate::error::{Result, TerminatorError};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;

/// Selector for the pods behind a service, `None` if the service selects nothing
pub fn service_selector(service: &Service) -> Option<String> {
    let selector = service.spec.as_ref()?.selector.as_ref()?;
    non_empty(render_match_labels(selector))
}

/// Selector for the pods of a deployment, `None` if the selector is empty
pub fn deployment_selector(deployment: &Deployment) -> Result<Option<String>> {
    match deployment.spec.as_ref() {
        Some(spec) => Ok(non_empty(render_label_selector(&spec.selector)?)),
        None => Ok(None),
    }
}

/// Render a full `LabelSelector`, equality terms first
pub fn render_label_selector(selector: &LabelSelector) -> Result<String> {
    let mut terms = Vec::new();

    if let Some(labels) = &selector.match_labels {
        let rendered = render_match_labels(labels);
        if !rendered.is_empty() {
            terms.push(rendered);
        }
    }

    for requirement in selector.match_expressions.iter().flatten() {
        terms.push(render_requirement(requirement)?);
    }

    Ok(terms.join(","))
}

fn render_match_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn render_requirement(requirement: &LabelSelectorRequirement) -> Result<String> {
    let key = &requirement.key;
    let mut values = requirement.values.clone().unwrap_or_default();
    values.sort();

    match requirement.operator.as_str() {
        "In" => Ok(format!("{key} in ({})", values.join(","))),
        "NotIn" => Ok(format!("{key} notin ({})", values.join(","))),
        "Exists" => Ok(key.clone()),
        "DoesNotExist" => Ok(format!("!{key}")),
        other => Err(TerminatorError::UnsupportedSelectorOperator {
            key: key.clone(),
            operator: other.to_string(),
        }),
    }
}

fn non_empty(selector: String) -> Option<String> {
    (!selector.is_empty()).then_some(selector)
}
