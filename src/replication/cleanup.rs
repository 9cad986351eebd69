// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Label-based removal of everything replicated into a namespace, for when
//! the in-memory ledger of a failed run is gone.

use crate::clone::metadata::owned_selector;
use crate::error::{is_not_found, CloneError, Result};
use crate::replication::network::delete_network_rules;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{
    api::{DeleteParams, ListParams},
    Api, Client,
};
use tracing::{info, instrument};

/// Delete every labeled configmap, secret and network rule in `namespace`
#[instrument(skip(client))]
pub async fn purge_replicated(client: &Client, namespace: &str) -> Result<()> {
    let lp = ListParams::default().labels(&owned_selector());
    let dp = DeleteParams::default();

    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    match config_maps.delete_collection(&dp, &lp).await {
        Ok(_) => info!("Deleted replicated configmaps in {}", namespace),
        Err(e) if is_not_found(&e) => {}
        Err(e) => {
            return Err(CloneError::external(
                format!("delete replicated configmaps in {}", namespace),
                e,
            ))
        }
    }

    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    match secrets.delete_collection(&dp, &lp).await {
        Ok(_) => info!("Deleted replicated secrets in {}", namespace),
        Err(e) if is_not_found(&e) => {}
        Err(e) => {
            return Err(CloneError::external(
                format!("delete replicated secrets in {}", namespace),
                e,
            ))
        }
    }

    delete_network_rules(client, &[namespace], &owned_selector()).await;
    Ok(())
}
