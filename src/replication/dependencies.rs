// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Copies the configmaps and secrets a cluster's pgbackrest configuration
//! references into the namespace of its clone.

use crate::clone::metadata::{filter_annotations, replicated_labels};
use crate::error::{is_already_exists, CloneError, Result};
use crate::types::postgres_cluster::{DependencyReference, PostgresCluster};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{DeleteParams, ObjectMeta, PostParams},
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tracing::{info, instrument, warn};

/// An object kind that can be copied between namespaces
pub trait Replicable:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
{
    const DEPENDENCY_KIND: &'static str;

    /// The copy of `self` to create in `namespace`
    fn replica(&self, namespace: &str) -> Self;
}

fn replica_metadata(original: &ObjectMeta, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: original.name.clone(),
        namespace: Some(namespace.to_string()),
        labels: Some(replicated_labels(original.labels.as_ref())),
        annotations: original.annotations.as_ref().map(filter_annotations),
        ..Default::default()
    }
}

impl Replicable for ConfigMap {
    const DEPENDENCY_KIND: &'static str = "configmap";

    fn replica(&self, namespace: &str) -> Self {
        ConfigMap {
            metadata: replica_metadata(&self.metadata, namespace),
            data: self.data.clone(),
            binary_data: self.binary_data.clone(),
            immutable: self.immutable,
        }
    }
}

impl Replicable for Secret {
    const DEPENDENCY_KIND: &'static str = "secret";

    fn replica(&self, namespace: &str) -> Self {
        Secret {
            metadata: replica_metadata(&self.metadata, namespace),
            data: self.data.clone(),
            string_data: None,
            type_: self.type_.clone(),
            immutable: self.immutable,
        }
    }
}

/// Names of the objects replicated into the target namespace, in creation order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicatedDependencies {
    pub config_maps: Vec<String>,
    pub secrets: Vec<String>,
}

impl ReplicatedDependencies {
    pub fn is_empty(&self) -> bool {
        self.config_maps.is_empty() && self.secrets.is_empty()
    }
}

/// Split the references of a cluster into configmap and secret names
pub fn partition_references(cluster: &PostgresCluster) -> (Vec<String>, Vec<String>) {
    let mut config_maps = vec![];
    let mut secrets = vec![];
    for reference in cluster.dependency_references() {
        match reference {
            DependencyReference::ConfigMap(name) => config_maps.push(name),
            DependencyReference::Secret(name) => secrets.push(name),
        }
    }
    (config_maps, secrets)
}

/// Copy one object from `from` to `to`, replacing an existing copy only when
/// `overwrite` is set.
#[instrument(skip(client), fields(kind = K::DEPENDENCY_KIND))]
pub async fn replicate_object<K: Replicable>(
    client: &Client,
    name: &str,
    from: &str,
    to: &str,
    overwrite: bool,
) -> Result<()> {
    let source: Api<K> = Api::namespaced(client.clone(), from);
    let original = source
        .get_opt(name)
        .await
        .map_err(|e| {
            CloneError::external(
                format!("get {} {}/{}", K::DEPENDENCY_KIND, from, name),
                e,
            )
        })?
        .ok_or_else(|| CloneError::DependencyNotFound {
            kind: K::DEPENDENCY_KIND,
            namespace: from.to_string(),
            name: name.to_string(),
        })?;

    let copy = original.replica(to);
    let target: Api<K> = Api::namespaced(client.clone(), to);
    let pp = PostParams::default();

    match target.create(&pp, &copy).await {
        Ok(_) => {
            info!("Copied {} {} from {} to {}", K::DEPENDENCY_KIND, name, from, to);
            Ok(())
        }
        Err(e) if is_already_exists(&e) && overwrite => {
            target.replace(name, &pp, &copy).await.map_err(|e| {
                CloneError::external(format!("replace {} {}/{}", K::DEPENDENCY_KIND, to, name), e)
            })?;
            info!("Overwrote {} {}/{} with the copy from {}", K::DEPENDENCY_KIND, to, name, from);
            Ok(())
        }
        Err(e) if is_already_exists(&e) => Err(CloneError::ConflictNotOverwritable {
            kind: K::DEPENDENCY_KIND,
            namespace: to.to_string(),
            name: name.to_string(),
        }),
        Err(e) => Err(CloneError::external(
            format!("create {} {}/{}", K::DEPENDENCY_KIND, to, name),
            e,
        )),
    }
}

/// Delete an object, reporting but never propagating a failure
pub async fn delete_best_effort<K: Replicable>(client: &Client, namespace: &str, name: &str) {
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => info!("Deleted {} {}/{}", K::DEPENDENCY_KIND, namespace, name),
        Err(e) => warn!(
            "Failed to delete {} {}/{}: {}",
            K::DEPENDENCY_KIND,
            namespace,
            name,
            e
        ),
    }
}

/// Delete replicated dependencies in creation order
pub async fn delete_dependencies(client: &Client, namespace: &str, replicated: &ReplicatedDependencies) {
    for name in &replicated.config_maps {
        delete_best_effort::<ConfigMap>(client, namespace, name).await;
    }
    for name in &replicated.secrets {
        delete_best_effort::<Secret>(client, namespace, name).await;
    }
}

/// Replicate every configmap, then every secret, the cluster depends on.
///
/// On the first failure the objects replicated so far by this call are
/// deleted again before the error is returned, so the caller only ever owns
/// the result of a complete replication.
#[instrument(
    skip(client, cluster),
    fields(cluster = %cluster.name_any(), from = %cluster.namespace().unwrap_or_default())
)]
pub async fn replicate_dependencies(
    client: &Client,
    cluster: &PostgresCluster,
    to: &str,
    overwrite: bool,
) -> Result<ReplicatedDependencies> {
    let from = cluster.namespace().unwrap_or_default();
    let (config_maps, secrets) = partition_references(cluster);
    let mut replicated = ReplicatedDependencies::default();

    let result = async {
        for name in &config_maps {
            replicate_object::<ConfigMap>(client, name, &from, to, overwrite).await?;
            replicated.config_maps.push(name.clone());
        }
        for name in &secrets {
            replicate_object::<Secret>(client, name, &from, to, overwrite).await?;
            replicated.secrets.push(name.clone());
        }
        Ok::<_, CloneError>(())
    }
    .await;

    match result {
        Ok(()) => Ok(replicated),
        Err(e) => {
            warn!(
                "Replication into {} failed, deleting {} objects copied so far",
                to,
                replicated.config_maps.len() + replicated.secrets.len()
            );
            delete_dependencies(client, to, &replicated).await;
            Err(e)
        }
    }
}
