// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Replica count of PostgresCluster instance sets.

use crate::constants::replicas::{MAX, MIN};
use crate::error::{CloneError, Result};
use crate::types::postgres_cluster::{InstanceSet, PostgresCluster};
use kube::{
    api::{ListParams, Patch, PatchParams},
    Api, Client, ResourceExt,
};
use serde_json::json;
use tracing::{info, instrument, warn};

pub fn check_replica_count(count: i32) -> Result<()> {
    if (MIN..=MAX).contains(&count) {
        Ok(())
    } else {
        Err(CloneError::InvalidInput(format!(
            "replica count must be between {} and {}, got {}",
            MIN, MAX, count
        )))
    }
}

/// The instance sets of `cluster` with every replica count set to `count`
pub fn instances_with_replicas(cluster: &PostgresCluster, count: i32) -> Vec<InstanceSet> {
    cluster
        .spec
        .instances
        .iter()
        .cloned()
        .map(|mut instance| {
            instance.replicas = Some(count);
            instance
        })
        .collect()
}

async fn patch_replicas(client: &Client, cluster: &PostgresCluster, count: i32) -> Result<()> {
    let namespace = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();
    let api: Api<PostgresCluster> = Api::namespaced(client.clone(), &namespace);

    // A merge patch replaces the whole list, so every instance set is sent
    let patch = json!({"spec": {"instances": instances_with_replicas(cluster, count)}});
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(|e| {
            CloneError::external(format!("update replica count of {}/{}", namespace, name), e)
        })?;

    info!("Set replica count of {}/{} to {}", namespace, name, count);
    Ok(())
}

#[instrument(skip(client))]
pub async fn set_replica_count(
    client: &Client,
    namespace: &str,
    cluster: &str,
    count: i32,
) -> Result<()> {
    check_replica_count(count)?;

    let api: Api<PostgresCluster> = Api::namespaced(client.clone(), namespace);
    let pg = api
        .get(cluster)
        .await
        .map_err(|e| CloneError::external(format!("get cluster {}/{}", namespace, cluster), e))?;
    pg.validate()?;

    patch_replicas(client, &pg, count).await
}

/// Outcome of a replica count change over several clusters
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplicaCountReport {
    pub updated: Vec<String>,
    /// `namespace/name` and the reason it was not updated
    pub failed: Vec<(String, String)>,
}

/// Set the replica count of every PostgresCluster in every namespace,
/// continuing past clusters that cannot be updated.
#[instrument(skip(client))]
pub async fn set_replica_count_all(client: &Client, count: i32) -> Result<ReplicaCountReport> {
    check_replica_count(count)?;

    let api: Api<PostgresCluster> = Api::all(client.clone());
    let clusters = api
        .list(&ListParams::default())
        .await
        .map_err(|e| CloneError::external("list clusters in all namespaces", e))?;
    info!("Changing replica count to {} for {} clusters", count, clusters.items.len());

    let mut report = ReplicaCountReport::default();
    for cluster in &clusters.items {
        let id = format!("{}/{}", cluster.namespace().unwrap_or_default(), cluster.name_any());
        let updated = match cluster.validate() {
            Ok(()) => patch_replicas(client, cluster, count).await,
            Err(e) => Err(e),
        };
        match updated {
            Ok(()) => report.updated.push(id),
            Err(e) => {
                warn!("Failed to update {}: {}", id, e);
                report.failed.push((id, e.to_string()));
            }
        }
    }

    Ok(report)
}
