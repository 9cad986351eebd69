// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Projection of a source cluster spec onto the subset a clone inherits.

use crate::clone::metadata::filter_spec_metadata;
use crate::constants::clone::{LOCAL_REPO, LOCAL_REPO_SIZE_FACTOR, SECOND_REPO_PREFIX};
use crate::types::postgres_cluster::{
    Backups, InstanceSet, ManualBackup, PgBackRest, PostgresClusterSpec, Repo,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Map a source spec onto a clone spec, without `dataSource`.
///
/// `monitoring` is left out: it embeds the monitoring user
/// password, which must not reach a clone.
pub fn project(source: &PostgresClusterSpec) -> PostgresClusterSpec {
    PostgresClusterSpec {
        data_source: None,
        metadata: source.metadata.as_ref().map(filter_spec_metadata),
        openshift: source.openshift,
        patroni: source.patroni.clone(),
        port: source.port,
        postgres_version: source.postgres_version,
        shutdown: source.shutdown,
        users: source.users.clone(),
        monitoring: None,
        instances: source.instances.iter().map(project_instance).collect(),
        backups: Backups {
            pgbackrest: project_pgbackrest(&source.backups.pgbackrest, source.instances.first()),
        },
    }
}

/// Keep only the sizing fields of an instance set. Affinity and topology
/// spread constraints are dropped so the clone can share nodes with the source.
fn project_instance(instance: &InstanceSet) -> InstanceSet {
    InstanceSet {
        name: instance.name.clone(),
        replicas: instance.replicas,
        resources: instance.resources.clone(),
        sidecars: instance.sidecars.clone(),
        data_volume_claim_spec: instance.data_volume_claim_spec.clone(),
        extra: BTreeMap::new(),
    }
}

fn project_pgbackrest(source: &PgBackRest, first_instance: Option<&InstanceSet>) -> PgBackRest {
    let global = source.global.as_ref().map(|global| {
        global
            .iter()
            .filter(|(k, _)| !k.starts_with(SECOND_REPO_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    });

    // Secrets are replicated next to the clone, never referenced from its spec
    let configuration = source.configuration.as_ref().and_then(|configuration| {
        let kept: Vec<_> = configuration
            .iter()
            .filter(|c| c.secret.is_none())
            .cloned()
            .collect();
        (!kept.is_empty()).then_some(kept)
    });

    let manual = source.manual.as_ref().map(|manual| ManualBackup {
        repo_name: LOCAL_REPO.to_string(),
        options: manual.options.clone(),
    });

    PgBackRest {
        configuration,
        global,
        jobs: source.jobs.clone(),
        manual,
        metadata: source.metadata.as_ref().map(filter_spec_metadata),
        repo_host: source.repo_host.clone(),
        sidecars: source.sidecars.clone(),
        repos: project_repos(&source.repos, first_instance),
        extra: BTreeMap::new(),
    }
}

/// A clone only ever has the local `repo1`.
///
/// An existing `repo1` is copied unmodified. Otherwise a new one is
/// synthesized with the schedules of the last scanned repository that has any.
pub fn project_repos(repos: &[Repo], first_instance: Option<&InstanceSet>) -> Vec<Repo> {
    let mut schedules = BTreeMap::new();
    for repo in repos {
        if repo.name == LOCAL_REPO {
            return vec![repo.clone()];
        }
        if let Some(s) = &repo.schedules {
            schedules = s.clone();
        }
    }

    let mut extra = BTreeMap::new();
    if let Some(claim) = first_instance.and_then(|i| i.data_volume_claim_spec.as_ref()) {
        extra.insert(
            "volume".to_string(),
            json!({ "volumeClaimSpec": scale_storage_request(claim, LOCAL_REPO_SIZE_FACTOR) }),
        );
    }

    vec![Repo {
        name: LOCAL_REPO.to_string(),
        schedules: Some(schedules),
        extra,
    }]
}

fn scale_storage_request(claim: &Value, factor: u64) -> Value {
    let mut claim = claim.clone();
    if let Some(storage) = claim.pointer_mut("/resources/requests/storage") {
        if let Some(scaled) = storage.as_str().and_then(|q| scale_quantity(q, factor)) {
            *storage = Value::String(scaled);
        }
    }
    claim
}

/// Multiply a `<integer><suffix>` quantity such as `10Gi`
fn scale_quantity(quantity: &str, factor: u64) -> Option<String> {
    let split = quantity
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(quantity.len());
    let (digits, suffix) = quantity.split_at(split);
    if suffix.contains(|c: char| !c.is_ascii_alphabetic()) {
        return None;
    }
    let value: u64 = digits.parse().ok()?;
    Some(format!("{}{}", value.checked_mul(factor)?, suffix))
}
