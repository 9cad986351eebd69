// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Label and annotation filtering.
//!
//! A clone, or anything copied for it, must not be adopted by the package
//! manager that owns the source, and must not inherit a pending restart.

use crate::constants::{annotations, labels, OPERATOR_NAME};
use crate::types::postgres_cluster::SpecMetadata;
use std::collections::BTreeMap;

fn is_helm_managed(key: &str, value: &str) -> bool {
    key == labels::MANAGED_BY && value == labels::HELM
}

pub fn filter_labels(values: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    values
        .iter()
        .filter(|(k, v)| !is_helm_managed(k, v) && k.as_str() != labels::HELM_CHART)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub fn filter_annotations(values: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    values
        .iter()
        .filter(|(k, v)| {
            !is_helm_managed(k, v)
                && k.as_str() != annotations::RESTARTED
                && k.as_str() != annotations::LAST_APPLIED
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub fn filter_spec_metadata(metadata: &SpecMetadata) -> SpecMetadata {
    SpecMetadata {
        labels: metadata.labels.as_ref().map(filter_labels),
        annotations: metadata.annotations.as_ref().map(filter_annotations),
    }
}

/// Labels for an object pgclone creates: the source labels minus package
/// manager ownership, plus the purpose tag used for bulk cleanup.
pub fn replicated_labels(source: Option<&BTreeMap<String, String>>) -> BTreeMap<String, String> {
    let mut result = source.map(filter_labels).unwrap_or_default();
    result.extend(owned_labels());
    result
}

/// The fixed label pair carried by everything pgclone creates
pub fn owned_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (labels::PURPOSE.to_string(), labels::PURPOSE_VALUE.to_string()),
        (labels::MANAGED_BY.to_string(), OPERATOR_NAME.to_string()),
    ])
}

/// Label selector matching everything pgclone creates
pub fn owned_selector() -> String {
    format!("{}={}", labels::PURPOSE, labels::PURPOSE_VALUE)
}

/// Labels of a network rule emitted for `clone`
pub fn clone_rule_labels(clone: &str) -> BTreeMap<String, String> {
    let mut result = owned_labels();
    result.insert(labels::CLONE.to_string(), clone.to_string());
    result
}

/// Label selector matching only the network rules emitted for `clone`
pub fn clone_selector(clone: &str) -> String {
    format!("{},{}={}", owned_selector(), labels::CLONE, clone)
}
