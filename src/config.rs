// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{bail, Result};
use std::env;

/// Tool configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Container running pgbackrest inside the primary pod
    pub database_container: String,
    /// Namespace of the cluster DNS pods, used in extension-dialect egress rules
    pub dns_namespace: String,
    /// Label selecting the cluster DNS pods
    pub dns_selector: (String, String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_container: "database".to_string(),
            dns_namespace: "kube-system".to_string(),
            dns_selector: ("k8s-app".to_string(), "kube-dns".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();

        let database_container = lookup("PGCLONE_DATABASE_CONTAINER")
            .unwrap_or(defaults.database_container);
        let dns_namespace = lookup("PGCLONE_DNS_NAMESPACE").unwrap_or(defaults.dns_namespace);
        let dns_selector = match lookup("PGCLONE_DNS_SELECTOR") {
            Some(raw) => match raw.split_once('=') {
                Some((k, v)) if !k.is_empty() && !v.is_empty() => (k.to_string(), v.to_string()),
                _ => bail!("PGCLONE_DNS_SELECTOR must be of the form key=value, got {:?}", raw),
            },
            None => defaults.dns_selector,
        };

        Ok(Config {
            database_container,
            dns_namespace,
            dns_selector,
        })
    }
}
