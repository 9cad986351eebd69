// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::{CloneError, Result};
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[kube(
    group = "postgres-operator.crunchydata.com",
    version = "v1beta1",
    kind = "PostgresCluster",
    plural = "postgresclusters"
)]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct PostgresClusterSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SpecMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openshift: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patroni: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    pub postgres_version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutdown: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<Value>>,
    /// Embeds the monitoring user password, never copied to a clone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<Value>,
    #[serde(default)]
    pub instances: Vec<InstanceSet>,
    pub backups: Backups,
}

/// Labels and annotations the operator propagates to every generated object
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct SpecMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecars: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_volume_claim_spec: Option<Value>,
    /// Affinity, topology spread constraints, tolerations, ...
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct Backups {
    pub pgbackrest: PgBackRest,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PgBackRest {
    /// Projected volumes mounted as additional pgbackrest configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Vec<ConfigurationProjection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual: Option<ManualBackup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SpecMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_host: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecars: Option<Value>,
    #[serde(default)]
    pub repos: Vec<Repo>,
    /// image, restore, ... (not carried over to a clone)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationProjection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ProjectionSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<ProjectionSource>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct ProjectionSource {
    pub name: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManualBackup {
    pub repo_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// A pgbackrest repository descriptor
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct Repo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedules: Option<BTreeMap<String, String>>,
    /// volume, s3, gcs, azure, ...
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres_cluster: Option<PostgresClusterDataSource>,
}

/// Which cluster, repository and recovery mode a clone restores from
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostgresClusterDataSource {
    pub cluster_name: String,
    pub repo_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// A configmap or secret the backup configuration depends on
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DependencyReference {
    ConfigMap(String),
    Secret(String),
}

impl PostgresCluster {
    /// Check the structural invariants every clone operation relies on
    pub fn validate(&self) -> Result<()> {
        if self.spec.instances.is_empty() {
            return Err(CloneError::InvalidInput(format!(
                "cluster {} has no instances",
                self.name_any()
            )));
        }
        if self.spec.backups.pgbackrest.repos.is_empty() {
            return Err(CloneError::InvalidInput(format!(
                "cluster {} has no pgbackrest repositories",
                self.name_any()
            )));
        }
        Ok(())
    }

    pub fn repos(&self) -> &[Repo] {
        &self.spec.backups.pgbackrest.repos
    }

    pub fn has_repo(&self, name: &str) -> bool {
        self.repos().iter().any(|r| r.name == name)
    }

    /// Configmaps and secrets referenced by the additional pgbackrest configuration
    pub fn dependency_references(&self) -> Vec<DependencyReference> {
        self.spec
            .backups
            .pgbackrest
            .configuration
            .iter()
            .flatten()
            .filter_map(|c| match (&c.config_map, &c.secret) {
                (Some(cm), _) => Some(DependencyReference::ConfigMap(cm.name.clone())),
                (None, Some(secret)) => Some(DependencyReference::Secret(secret.name.clone())),
                (None, None) => None,
            })
            .collect()
    }
}
