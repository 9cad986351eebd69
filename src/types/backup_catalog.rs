// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Model of the `pgbackrest info --output=json` document.

use serde::{Deserialize, Serialize};

/// One stanza of the catalog. pgbackrest returns a JSON array of these.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct StanzaInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "archive")]
    pub archives: Vec<ArchiveInfo>,
    #[serde(default, rename = "backup")]
    pub backups: Vec<BackupCatalogEntry>,
}

/// WAL range required to rebuild the database since the oldest backup
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ArchiveInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub min: Option<String>,
    #[serde(default)]
    pub max: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BackupCatalogEntry {
    pub label: String,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    #[serde(default, rename = "error")]
    pub error_occurred: bool,
    pub timestamp: BackupTimestamps,
    #[serde(default)]
    pub prior: Option<String>,
    #[serde(default, rename = "reference", deserialize_with = "null_as_empty")]
    pub references: Vec<String>,
}

/// Unix seconds
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackupTimestamps {
    pub start: i64,
    pub stop: i64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackupType {
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "incr")]
    Incremental,
    #[serde(rename = "diff")]
    Differential,
    #[serde(other)]
    Unknown,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse the catalog document returned by pgbackrest
pub fn parse_catalog(json: &str) -> serde_json::Result<Vec<StanzaInfo>> {
    serde_json::from_str(json)
}
