// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Remote command execution inside a pod container

use crate::error::{CloneError, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::{api::AttachParams, Api, Client};
use std::future::Future;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs a command inside a named pod container
pub trait CommandExecutor {
    fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> impl Future<Output = Result<ExecOutput>> + Send;
}

/// Executes through the pod `exec` subresource
#[derive(Clone)]
pub struct PodExecutor {
    client: Client,
}

impl PodExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl CommandExecutor for PodExecutor {
    #[instrument(skip(self, command))]
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> Result<ExecOutput> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);
        let context = || format!("exec {:?} in {}/{}", command.join(" "), namespace, pod);

        debug!("Executing {:?}", command);
        let mut attached = pods
            .exec(pod, command.to_vec(), &params)
            .await
            .map_err(|e| CloneError::external(context(), e))?;

        let mut stdout_reader = attached
            .stdout()
            .ok_or_else(|| CloneError::external(context(), "stdout not attached"))?;
        let mut stderr_reader = attached
            .stderr()
            .ok_or_else(|| CloneError::external(context(), "stderr not attached"))?;
        let status = attached.take_status();

        let mut output = ExecOutput::default();
        let (out, err) = tokio::join!(
            stdout_reader.read_to_string(&mut output.stdout),
            stderr_reader.read_to_string(&mut output.stderr)
        );
        out.map_err(|e| CloneError::external(context(), e))?;
        err.map_err(|e| CloneError::external(context(), e))?;

        if let Some(status) = status {
            if let Some(status) = status.await {
                if status.status.as_deref() == Some("Failure") {
                    return Err(CloneError::external(
                        context(),
                        status.message.unwrap_or_else(|| "command failed".to_string()),
                    ));
                }
            }
        }

        attached
            .join()
            .await
            .map_err(|e| CloneError::external(context(), e))?;

        Ok(output)
    }
}
