// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Namespace management utilities

use crate::error::{is_already_exists, is_not_found, CloneError, Result};
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{ObjectMeta, PostParams},
    Api, Client,
};
use tracing::{debug, info, instrument};

/// Ensure a namespace exists in the cluster, create if it doesn't.
///
/// Returns true when the namespace was created by this call. Losing a
/// creation race to another client counts as already existing.
#[instrument(skip(client))]
pub async fn ensure_namespace_exists(client: &Client, namespace: &str) -> Result<bool> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    match namespaces.get(namespace).await {
        Ok(_) => {
            debug!("Namespace {} already exists", namespace);
            Ok(false)
        }
        Err(e) if is_not_found(&e) => {
            info!("Namespace {} does not exist, creating it", namespace);
            let ns = Namespace {
                metadata: ObjectMeta {
                    name: Some(namespace.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            };
            match namespaces.create(&PostParams::default(), &ns).await {
                Ok(_) => {
                    info!("Namespace {} created successfully", namespace);
                    Ok(true)
                }
                Err(e) if is_already_exists(&e) => {
                    debug!("Namespace {} was created concurrently", namespace);
                    Ok(false)
                }
                Err(e) => Err(CloneError::external(format!("create namespace {}", namespace), e)),
            }
        }
        Err(e) => Err(CloneError::external(
            format!("check namespace {}", namespace),
            e,
        )),
    }
}
