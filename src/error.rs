// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum CloneError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{repo:?} is not a valid repo for cluster {cluster:?}")]
    InvalidRepository { repo: String, cluster: String },

    #[error("the requested PITR {0:?} is before any full backup for this cluster, cannot restore before the oldest full backup")]
    PitrBeforeOldestBackup(String),

    #[error("{kind} {namespace}/{name} not found")]
    DependencyNotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("{kind} {namespace}/{name} already exists and overwrite was not requested")]
    ConflictNotOverwritable {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("Failed to {context}: {source}")]
    ExternalCallFailed {
        context: String,
        #[source]
        source: BoxError,
    },
}

impl CloneError {
    pub fn external(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        CloneError::ExternalCallFailed {
            context: context.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloneError>;

/// True when the API server answered 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

/// True when the API server answered 409
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 409)
}
