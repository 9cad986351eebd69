// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for namespace management, pod exec and backup catalogs.

pub mod backups;
pub mod exec;
pub mod namespaces;

pub use backups::{fetch_catalog, show_backups, InfoFormat};
pub use exec::{CommandExecutor, ExecOutput, PodExecutor};
pub use namespaces::ensure_namespace_exists;
