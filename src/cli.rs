// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Command line surface.

use crate::clone::RecoveryMode;
use crate::config::Config;
use crate::kubernetes::{show_backups, InfoFormat, PodExecutor};
use crate::replicas::{set_replica_count, set_replica_count_all};
use crate::replication::{purge_replicated, CloneRequest, CloneSaga};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use kube::{Client, ResourceExt};
use tracing::info;

/// Clone PostgresClusters from their pgbackrest backups
#[derive(Parser, Debug)]
#[command(name = "pgclone", version)]
#[command(about = "Clone PostgresClusters from their pgbackrest backups", long_about = None)]
pub struct Cli {
    /// Namespace of the source cluster, defaults to the kubeconfig namespace
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a clone restored from a backup of CLUSTER
    Clone(CloneArgs),
    /// Print the backups pgbackrest knows for CLUSTER
    ShowBackups {
        cluster: String,
        /// Repository to inspect, all repositories when omitted
        #[arg(long, default_value = "")]
        repo_name: String,
        #[arg(long, value_enum, default_value_t = InfoFormat::Text)]
        output: InfoFormat,
    },
    /// Set the number of replicas (including the primary) of a cluster
    ReplicaCount {
        cluster: Option<String>,
        /// Replicas per instance set, between 1 and 4
        #[arg(long, default_value_t = 2, allow_negative_numbers = true)]
        value: i32,
        /// Update every cluster in every namespace
        #[arg(long, conflicts_with = "cluster")]
        all: bool,
    },
    /// Delete every configmap, secret and network rule replicated into the namespace
    Cleanup,
}

#[derive(Args, Debug)]
pub struct CloneArgs {
    pub cluster: String,
    /// Repository to restore from, the first repository when omitted
    #[arg(long, default_value = "")]
    pub repo_name: String,
    /// Namespace of the clone, the source namespace when omitted
    #[arg(long, default_value = "")]
    pub target_namespace: String,
    /// Overwrite configmaps and secrets already present in the target namespace
    #[arg(long)]
    pub overwrite: bool,
    /// Point in time to recover to, e.g. "2022-12-28 15:47:38+01"
    #[arg(long, conflicts_with = "last_backup")]
    pub pitr: Option<String>,
    /// Restore the most recent backup without replaying WAL
    #[arg(long)]
    pub last_backup: bool,
    /// Print the clone instead of creating it
    #[arg(long)]
    pub dry_run: bool,
}

impl CloneArgs {
    pub fn recovery_mode(&self) -> RecoveryMode {
        match (&self.pitr, self.last_backup) {
            (Some(target), _) => RecoveryMode::Pitr(target.clone()),
            (None, true) => RecoveryMode::MostRecentBackup,
            (None, false) => RecoveryMode::Latest,
        }
    }

    pub fn into_request(self, namespace: String) -> CloneRequest {
        CloneRequest {
            recovery: self.recovery_mode(),
            cluster: self.cluster,
            namespace,
            repo_name: self.repo_name,
            target_namespace: self.target_namespace,
            overwrite: self.overwrite,
        }
    }
}

pub async fn run(cli: Cli, client: Client, config: Config) -> Result<()> {
    let namespace = cli
        .namespace
        .unwrap_or_else(|| client.default_namespace().to_string());
    let executor = PodExecutor::new(client.clone());

    match cli.command {
        Command::Clone(args) => {
            let dry_run = args.dry_run;
            let request = args.into_request(namespace);
            let mut saga = CloneSaga::new(&client, &executor, &config);

            if dry_run {
                let (_, clone) = saga.plan(&request).await?;
                print!(
                    "{}",
                    serde_yaml::to_string(&clone).context("Failed to serialize clone")?
                );
            } else {
                let created = saga.run(&request).await?;
                println!(
                    "Clone {}/{} created",
                    created.namespace().unwrap_or_default(),
                    created.name_any()
                );
            }
        }
        Command::ShowBackups {
            cluster,
            repo_name,
            output,
        } => {
            let backups = show_backups(
                &client, &executor, &config, &namespace, &cluster, &repo_name, output,
            )
            .await?;
            print!("{}", backups);
        }
        Command::ReplicaCount {
            cluster,
            value,
            all,
        } => match (cluster, all) {
            (_, true) => {
                let report = set_replica_count_all(&client, value).await?;
                info!("Updated {} clusters", report.updated.len());
                if !report.failed.is_empty() {
                    let details: Vec<String> = report
                        .failed
                        .iter()
                        .map(|(id, reason)| format!("{}: {}", id, reason))
                        .collect();
                    bail!(
                        "Failed to update at least one cluster:\n - {}",
                        details.join("\n - ")
                    );
                }
            }
            (Some(cluster), false) => set_replica_count(&client, &namespace, &cluster, value).await?,
            (None, false) => bail!("Either a cluster name or --all is required"),
        },
        Command::Cleanup => purge_replicated(&client, &namespace).await?,
    }

    Ok(())
}
