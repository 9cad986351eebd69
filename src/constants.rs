// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Label keys and values used on the clone and on every object pgclone creates
pub mod labels {
    /// Identifies the pods of a PostgresCluster
    pub const CLUSTER: &str = "postgres-operator.crunchydata.com/cluster";
    pub const DATA: &str = "postgres-operator.crunchydata.com/data";
    pub const ROLE: &str = "postgres-operator.crunchydata.com/role";

    /// Purpose tag used to bulk-discover replicated objects and network rules
    pub const PURPOSE: &str = "purpose";
    pub const PURPOSE_VALUE: &str = "automatic-test-backup-restore";
    /// Name of the clone a network rule was emitted for
    pub const CLONE: &str = "pgclone/clone";

    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const HELM: &str = "Helm";
    pub const HELM_CHART: &str = "helm.sh/chart";

    /// Set on every namespace by the API server
    pub const NAMESPACE_NAME: &str = "kubernetes.io/metadata.name";
}

/// Annotation keys filtered out of the clone
pub mod annotations {
    pub const RESTARTED: &str = "restarted";
    pub const LAST_APPLIED: &str = "kubectl.kubernetes.io/last-applied-configuration";
}

/// The tool name, used as the ownership marker on created objects
pub const OPERATOR_NAME: &str = "pgclone";

/// Clone naming
pub mod clone {
    pub const NAME_PREFIX: &str = "clone-";
    /// DNS-1123 label limit
    pub const MAX_NAME_LEN: usize = 63;
    /// The only repository a clone is configured with
    pub const LOCAL_REPO: &str = "repo1";
    /// Global pgBackRest settings for the second repository slot
    pub const SECOND_REPO_PREFIX: &str = "repo2";
    /// Local repository size relative to the instance volume
    pub const LOCAL_REPO_SIZE_FACTOR: u64 = 3;
}

/// Replica count bounds accepted by `replica-count`
pub mod replicas {
    pub const MIN: i32 = 1;
    pub const MAX: i32 = 4;
}
