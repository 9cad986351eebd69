// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Sequences dependency replication, network rule injection and clone
//! creation, undoing every applied step when a later one fails.

use crate::clone::metadata::clone_selector;
use crate::clone::pitr::{check_against_catalog, is_syntactically_valid};
use crate::clone::{generate, RecoveryMode};
use crate::config::Config;
use crate::error::{CloneError, Result};
use crate::kubernetes::{ensure_namespace_exists, fetch_catalog, CommandExecutor};
use crate::replication::dependencies::{
    delete_dependencies, replicate_dependencies, ReplicatedDependencies,
};
use crate::replication::network::{delete_network_rules, inject_if_needed, NetworkRuleRef};
use crate::types::postgres_cluster::PostgresCluster;
use kube::{api::PostParams, Api, Client, ResourceExt};
use tracing::{debug, info, instrument, warn};

/// Everything one clone invocation needs, fixed before the saga starts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneRequest {
    pub cluster: String,
    pub namespace: String,
    /// Repository to restore from; empty selects the first one
    pub repo_name: String,
    /// Namespace of the clone; empty places it next to the source
    pub target_namespace: String,
    /// Replace configmaps and secrets already present in the target namespace
    pub overwrite: bool,
    pub recovery: RecoveryMode,
}

impl CloneRequest {
    /// Checks that need no cluster access
    pub fn validate(&self) -> Result<()> {
        if self.cluster.is_empty() {
            return Err(CloneError::InvalidInput("cluster name is required".to_string()));
        }
        if self.namespace.is_empty() {
            return Err(CloneError::InvalidInput("namespace is required".to_string()));
        }
        if let RecoveryMode::Pitr(target) = &self.recovery {
            if !is_syntactically_valid(target) {
                return Err(CloneError::InvalidInput(format!(
                    "PITR {:?} must look like \"2022-12-28 15:47:38+01\"",
                    target
                )));
            }
        }
        Ok(())
    }

    /// True when the clone does not live next to its source
    pub fn is_cross_namespace(&self) -> bool {
        !self.target_namespace.is_empty() && self.target_namespace != self.namespace
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    Init,
    DependenciesReplicated,
    NetworkRulesInjected,
    CloneCreated,
    Done,
    RollingBack,
    Failed,
}

/// Side effects applied so far, in application order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationLedger {
    pub dependencies: ReplicatedDependencies,
    pub network_rules: Vec<NetworkRuleRef>,
}

pub struct CloneSaga<'a, E> {
    client: &'a Client,
    executor: &'a E,
    config: &'a Config,
    state: SagaState,
    ledger: ReplicationLedger,
}

impl<'a, E: CommandExecutor> CloneSaga<'a, E> {
    pub fn new(client: &'a Client, executor: &'a E, config: &'a Config) -> Self {
        Self {
            client,
            executor,
            config,
            state: SagaState::Init,
            ledger: ReplicationLedger::default(),
        }
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn ledger(&self) -> &ReplicationLedger {
        &self.ledger
    }

    fn transition(&mut self, next: SagaState) {
        debug!("Clone saga {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Fetch the source and generate its clone without changing anything.
    ///
    /// A PITR target is checked against the backup catalog of the source.
    #[instrument(skip(self), fields(cluster = %request.cluster, namespace = %request.namespace))]
    pub async fn plan(&self, request: &CloneRequest) -> Result<(PostgresCluster, PostgresCluster)> {
        request.validate()?;

        let clusters: Api<PostgresCluster> = Api::namespaced(self.client.clone(), &request.namespace);
        let source = clusters.get(&request.cluster).await.map_err(|e| {
            CloneError::external(
                format!("get cluster {}/{}", request.namespace, request.cluster),
                e,
            )
        })?;
        source.validate()?;

        let clone = generate(
            &source,
            &request.repo_name,
            &request.target_namespace,
            &request.recovery,
        )?;

        if let RecoveryMode::Pitr(target) = &request.recovery {
            let repo_name = clone
                .spec
                .data_source
                .as_ref()
                .and_then(|d| d.postgres_cluster.as_ref())
                .map(|p| p.repo_name.as_str())
                .unwrap_or_default();
            let catalog = fetch_catalog(
                self.client,
                self.executor,
                self.config,
                &request.namespace,
                &request.cluster,
                repo_name,
            )
            .await?;
            check_against_catalog(target, &catalog)?;
        }

        Ok((source, clone))
    }

    /// Create the clone, replicating what it needs into its namespace first.
    ///
    /// On failure every step already applied is undone on a best-effort
    /// basis and the error of the failing step is returned.
    #[instrument(skip(self), fields(cluster = %request.cluster, namespace = %request.namespace))]
    pub async fn run(&mut self, request: &CloneRequest) -> Result<PostgresCluster> {
        let (source, clone) = match self.plan(request).await {
            Ok(planned) => planned,
            Err(e) => {
                self.transition(SagaState::Failed);
                return Err(e);
            }
        };

        match self.apply(request, &source, &clone).await {
            Ok(created) => {
                self.transition(SagaState::Done);
                Ok(created)
            }
            Err(e) => {
                warn!("Clone of {} failed: {}", request.cluster, e);
                if self.state != SagaState::Init {
                    self.rollback(request, &clone.name_any()).await;
                }
                self.transition(SagaState::Failed);
                Err(e)
            }
        }
    }

    async fn apply(
        &mut self,
        request: &CloneRequest,
        source: &PostgresCluster,
        clone: &PostgresCluster,
    ) -> Result<PostgresCluster> {
        if request.is_cross_namespace() {
            if ensure_namespace_exists(self.client, &request.target_namespace).await? {
                info!(
                    "Created namespace {}, it is kept if the clone fails",
                    request.target_namespace
                );
            }

            self.ledger.dependencies = replicate_dependencies(
                self.client,
                source,
                &request.target_namespace,
                request.overwrite,
            )
            .await?;
            self.transition(SagaState::DependenciesReplicated);

            self.ledger.network_rules = inject_if_needed(self.client, self.config, source, clone).await?;
            self.transition(SagaState::NetworkRulesInjected);
        } else {
            debug!("Clone stays in {}, nothing to replicate", request.namespace);
        }

        let namespace = clone.namespace().unwrap_or_default();
        let clusters: Api<PostgresCluster> = Api::namespaced(self.client.clone(), &namespace);
        let created = clusters
            .create(&PostParams::default(), clone)
            .await
            .map_err(|e| {
                CloneError::external(format!("create clone {}/{}", namespace, clone.name_any()), e)
            })?;
        self.transition(SagaState::CloneCreated);
        info!("Created clone {}/{}", namespace, created.name_any());

        Ok(created)
    }

    /// Undo the replication of `clone`. Only rules labeled with its name are
    /// deleted, so rules of other clones of the same source are kept.
    async fn rollback(&mut self, request: &CloneRequest, clone: &str) {
        self.transition(SagaState::RollingBack);
        info!(
            "Rolling back {} configmaps, {} secrets and {} network rules",
            self.ledger.dependencies.config_maps.len(),
            self.ledger.dependencies.secrets.len(),
            self.ledger.network_rules.len()
        );

        delete_dependencies(self.client, &request.target_namespace, &self.ledger.dependencies).await;
        delete_network_rules(
            self.client,
            &[request.target_namespace.as_str(), request.namespace.as_str()],
            &clone_selector(clone),
        )
        .await;
    }
}
