// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Builds the clone PostgresCluster from a source cluster. Pure, no API calls.

use crate::clone::metadata::{filter_annotations, filter_labels};
use crate::clone::projector::project;
use crate::constants::clone::{MAX_NAME_LEN, NAME_PREFIX};
use crate::error::{CloneError, Result};
use crate::types::postgres_cluster::{DataSource, PostgresCluster, PostgresClusterDataSource};
use kube::ResourceExt;

/// What the clone restores to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RecoveryMode {
    /// Most recent consistent state, including archived WAL
    #[default]
    Latest,
    /// The most recent backup, without replaying WAL past it
    MostRecentBackup,
    /// A point in time, already syntactically validated
    Pitr(String),
}

impl RecoveryMode {
    /// Restore options passed to pgbackrest through the data source
    pub fn restore_options(&self) -> Option<Vec<String>> {
        match self {
            RecoveryMode::Latest => None,
            RecoveryMode::MostRecentBackup => Some(vec!["--type=immediate".to_string()]),
            RecoveryMode::Pitr(target) => Some(vec![
                "--type=time".to_string(),
                format!("--target=\"{}\"", target),
            ]),
        }
    }
}

/// Name of the clone of `source`: a fixed prefix, cut to the DNS label limit
pub fn clone_name(source: &str) -> String {
    let mut name = format!("{}{}", NAME_PREFIX, source);
    if name.len() > MAX_NAME_LEN {
        name.truncate(MAX_NAME_LEN);
        name.truncate(name.trim_end_matches('-').len());
    }
    name
}

/// Generate the clone specification.
///
/// `repo_name` selects the repository to restore from; empty means the first
/// repository of the source. An empty `target_namespace` places the clone next
/// to its source.
pub fn generate(
    source: &PostgresCluster,
    repo_name: &str,
    target_namespace: &str,
    recovery: &RecoveryMode,
) -> Result<PostgresCluster> {
    if !repo_name.is_empty() && !source.has_repo(repo_name) {
        return Err(CloneError::InvalidRepository {
            repo: repo_name.to_string(),
            cluster: source.name_any(),
        });
    }
    source.validate()?;

    let repo_name = match repo_name {
        "" => source.repos()[0].name.clone(),
        name => name.to_string(),
    };

    let source_namespace = source.namespace().unwrap_or_default();
    let (namespace, cluster_namespace) = if target_namespace.is_empty() {
        (source_namespace, None)
    } else {
        (target_namespace.to_string(), Some(source_namespace))
    };

    let mut spec = project(&source.spec);
    spec.data_source = Some(DataSource {
        postgres_cluster: Some(PostgresClusterDataSource {
            cluster_name: source.name_any(),
            repo_name,
            cluster_namespace,
            options: recovery.restore_options(),
        }),
    });

    let mut clone = PostgresCluster::new(&clone_name(&source.name_any()), spec);
    clone.metadata.namespace = Some(namespace);
    clone.metadata.labels = source.metadata.labels.as_ref().map(filter_labels);
    clone.metadata.annotations = source.metadata.annotations.as_ref().map(filter_annotations);

    Ok(clone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_source() -> PostgresCluster {
        serde_json::from_value(json!({
            "apiVersion": "postgres-operator.crunchydata.com/v1beta1",
            "kind": "PostgresCluster",
            "metadata": {
                "name": "hippo",
                "namespace": "db",
                "uid": "1234",
                "resourceVersion": "42",
                "labels": {"app.kubernetes.io/managed-by": "Helm", "helm.sh/chart": "pg-1", "app": "hippo"},
                "annotations": {
                    "kubectl.kubernetes.io/last-applied-configuration": "{}",
                    "meta.helm.sh/release-name": "hippo",
                },
            },
            "spec": {
                "postgresVersion": 15,
                "instances": [{"name": "pg", "replicas": 1}],
                "backups": {"pgbackrest": {"repos": [
                    {"name": "repo1", "volume": {}},
                    {"name": "repo2", "s3": {"bucket": "b"}},
                ]}},
            },
        }))
        .unwrap()
    }

    fn data_source(clone: &PostgresCluster) -> &PostgresClusterDataSource {
        clone
            .spec
            .data_source
            .as_ref()
            .and_then(|d| d.postgres_cluster.as_ref())
            .unwrap()
    }

    #[test]
    fn test_clone_name() {
        assert_eq!(clone_name("hippo"), "clone-hippo");
    }

    #[test]
    fn test_clone_name_truncated() {
        let long = "a".repeat(70);
        let name = clone_name(&long);
        assert_eq!(name.len(), MAX_NAME_LEN);
        assert!(name.starts_with("clone-"));
    }

    #[test]
    fn test_clone_name_truncation_trims_dash() {
        // prefix (6) + 56 chars puts a dash at position 63
        let source = format!("{}-tail", "b".repeat(56));
        let name = clone_name(&source);
        assert!(!name.ends_with('-'));
        assert_eq!(name.len(), MAX_NAME_LEN - 1);
    }

    #[test]
    fn test_generate_same_namespace() {
        let clone = generate(&make_source(), "repo2", "", &RecoveryMode::Latest).unwrap();

        assert_eq!(clone.name_any(), "clone-hippo");
        assert_eq!(clone.namespace().as_deref(), Some("db"));
        let ds = data_source(&clone);
        assert_eq!(ds.cluster_name, "hippo");
        assert_eq!(ds.repo_name, "repo2");
        assert_eq!(ds.cluster_namespace, None);
        assert_eq!(ds.options, None);
    }

    #[test]
    fn test_generate_other_namespace() {
        let clone = generate(&make_source(), "repo1", "restore-test", &RecoveryMode::Latest).unwrap();

        assert_eq!(clone.namespace().as_deref(), Some("restore-test"));
        assert_eq!(data_source(&clone).cluster_namespace.as_deref(), Some("db"));
    }

    #[test]
    fn test_generate_defaults_to_first_repo() {
        let clone = generate(&make_source(), "", "", &RecoveryMode::Latest).unwrap();
        assert_eq!(data_source(&clone).repo_name, "repo1");
    }

    #[test]
    fn test_generate_most_recent_backup() {
        let clone = generate(&make_source(), "repo1", "", &RecoveryMode::MostRecentBackup).unwrap();
        assert_eq!(
            data_source(&clone).options,
            Some(vec!["--type=immediate".to_string()])
        );
    }

    #[test]
    fn test_generate_pitr() {
        let recovery = RecoveryMode::Pitr("2022-12-28 15:47:38+01".to_string());
        let clone = generate(&make_source(), "repo1", "", &recovery).unwrap();
        assert_eq!(
            data_source(&clone).options,
            Some(vec![
                "--type=time".to_string(),
                "--target=\"2022-12-28 15:47:38+01\"".to_string(),
            ])
        );
    }

    #[test]
    fn test_generate_invalid_repo() {
        let result = generate(&make_source(), "repoBogus", "", &RecoveryMode::Latest);
        assert!(matches!(
            result,
            Err(CloneError::InvalidRepository { ref repo, ref cluster }) if repo == "repoBogus" && cluster == "hippo"
        ));
    }

    #[test]
    fn test_generate_filters_metadata() {
        let clone = generate(&make_source(), "repo1", "", &RecoveryMode::Latest).unwrap();

        let labels = clone.labels();
        assert!(!labels.contains_key("app.kubernetes.io/managed-by"));
        assert!(!labels.contains_key("helm.sh/chart"));
        assert_eq!(labels.get("app").unwrap(), "hippo");

        let annotations = clone.annotations();
        assert!(!annotations.contains_key("kubectl.kubernetes.io/last-applied-configuration"));
        assert!(annotations.contains_key("meta.helm.sh/release-name"));

        assert!(clone.metadata.uid.is_none());
        assert!(clone.metadata.resource_version.is_none());
    }

    #[test]
    fn test_generate_copies_kind() {
        let clone = generate(&make_source(), "repo1", "", &RecoveryMode::Latest).unwrap();
        let value = serde_json::to_value(&clone).unwrap();
        assert_eq!(value["apiVersion"], "postgres-operator.crunchydata.com/v1beta1");
        assert_eq!(value["kind"], "PostgresCluster");
    }
}
