// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Backup catalog retrieval through `pgbackrest info` on the primary pod

use crate::config::Config;
use crate::constants::labels;
use crate::error::{CloneError, Result};
use crate::kubernetes::exec::CommandExecutor;
use crate::types::backup_catalog::{parse_catalog, StanzaInfo};
use k8s_openapi::api::core::v1::Pod;
use kube::{api::ListParams, Api, Client, ResourceExt};
use tracing::{debug, info, instrument};

/// Selector of the primary instance pod of a cluster
pub fn primary_instance_selector(cluster: &str) -> String {
    format!(
        "{}={},{}=postgres,{}=master",
        labels::CLUSTER,
        cluster,
        labels::DATA,
        labels::ROLE
    )
}

/// Output format of `pgbackrest info`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum InfoFormat {
    #[default]
    Text,
    Json,
}

impl InfoFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoFormat::Text => "text",
            InfoFormat::Json => "json",
        }
    }
}

/// Shell command printing the catalog, optionally restricted to one repository
pub fn pgbackrest_info_command(format: InfoFormat, repo_name: &str) -> Result<Vec<String>> {
    let repo_num = repo_name.strip_prefix("repo").unwrap_or(repo_name);
    if !repo_num.chars().all(|c| c.is_ascii_digit()) {
        return Err(CloneError::InvalidInput(format!(
            "invalid repository name {:?}",
            repo_name
        )));
    }

    let mut command = format!("pgbackrest info --output={}", format.as_str());
    if !repo_num.is_empty() {
        command.push_str(&format!(" --repo={}", repo_num));
    }

    Ok(["bash", "-ceu", "--"]
        .into_iter()
        .map(String::from)
        .chain(std::iter::once(command))
        .collect())
}

#[instrument(skip(client))]
pub async fn find_primary_pod(client: &Client, namespace: &str, cluster: &str) -> Result<String> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let lp = ListParams::default().labels(&primary_instance_selector(cluster));
    let pods = pods
        .list(&lp)
        .await
        .map_err(|e| CloneError::external(format!("list pods of cluster {}/{}", namespace, cluster), e))?;

    match pods.items.as_slice() {
        [primary] => Ok(primary.name_any()),
        found => Err(CloneError::external(
            format!("find primary pod of cluster {}/{}", namespace, cluster),
            format!("expected exactly one primary instance pod, found {}", found.len()),
        )),
    }
}

/// Run `pgbackrest info` on the primary pod and return its stdout
#[instrument(skip(client, executor, config))]
pub async fn show_backups<E: CommandExecutor>(
    client: &Client,
    executor: &E,
    config: &Config,
    namespace: &str,
    cluster: &str,
    repo_name: &str,
    format: InfoFormat,
) -> Result<String> {
    let command = pgbackrest_info_command(format, repo_name)?;
    let pod = find_primary_pod(client, namespace, cluster).await?;
    debug!("Reading backup catalog from pod {}/{}", namespace, pod);

    let result = executor
        .exec(namespace, &pod, &config.database_container, &command)
        .await?;

    if !result.stderr.trim().is_empty() {
        return Err(CloneError::external(
            format!("get backup info for cluster {}/{} on repo {:?}", namespace, cluster, repo_name),
            result.stderr,
        ));
    }

    Ok(result.stdout)
}

/// Fetch and parse the JSON backup catalog of a cluster
pub async fn fetch_catalog<E: CommandExecutor>(
    client: &Client,
    executor: &E,
    config: &Config,
    namespace: &str,
    cluster: &str,
    repo_name: &str,
) -> Result<Vec<StanzaInfo>> {
    let json = show_backups(client, executor, config, namespace, cluster, repo_name, InfoFormat::Json).await?;
    let stanzas = parse_catalog(&json)
        .map_err(|e| CloneError::external("parse backup catalog", e))?;
    info!(
        "Backup catalog of {}/{} lists {} backups",
        namespace,
        cluster,
        stanzas.iter().map(|s| s.backups.len()).sum::<usize>()
    );
    Ok(stanzas)
}
