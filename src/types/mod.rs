// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Typed documents: the PostgresCluster resource and the backup catalog.

pub mod backup_catalog;
pub mod postgres_cluster;

pub use backup_catalog::{BackupCatalogEntry, BackupType, StanzaInfo};
pub use postgres_cluster::{DependencyReference, PostgresCluster, PostgresClusterSpec};
