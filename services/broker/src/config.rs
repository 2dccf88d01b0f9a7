use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::lifecycle::OrchestratorSettings;
use crate::operations::DEFAULT_MAX_CONCURRENT_TASKS;

/// Memory of the in-process development cluster: 1024 GB.
pub const DEFAULT_CLUSTER_MEMORY_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub krb_realm: String,
    pub max_concurrent_tasks: usize,
    pub cluster_memory_mb: f64,
    pub resource_manager_url: String,
    pub catalog_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_addr = var("BROKER_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .context("invalid BROKER_LISTEN_ADDR")?;

        let log_level = var("BROKER_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let krb_realm = var("BROKER_KRB_REALM").unwrap_or_else(|| "EXAMPLE.COM".to_string());

        let max_concurrent_tasks = match var("BROKER_MAX_CONCURRENT_TASKS") {
            Some(v) => v
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("invalid BROKER_MAX_CONCURRENT_TASKS: {v}"))?,
            None => DEFAULT_MAX_CONCURRENT_TASKS,
        };

        let cluster_memory_mb = match var("BROKER_CLUSTER_MEMORY_MB") {
            Some(v) => v
                .parse::<f64>()
                .ok()
                .filter(|mb| mb.is_finite() && *mb > 0.0)
                .with_context(|| format!("invalid BROKER_CLUSTER_MEMORY_MB: {v}"))?,
            None => DEFAULT_CLUSTER_MEMORY_MB,
        };

        let resource_manager_url = var("BROKER_RESOURCE_MANAGER_URL")
            .unwrap_or_else(|| "http://localhost:8088".to_string());

        let catalog_file = var("BROKER_CATALOG_FILE")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            listen_addr,
            log_level,
            krb_realm,
            max_concurrent_tasks,
            cluster_memory_mb,
            resource_manager_url,
            catalog_file,
        })
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            krb_realm: self.krb_realm.clone(),
            resource_manager_url: self.resource_manager_url.clone(),
            max_concurrent_tasks: self.max_concurrent_tasks,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.krb_realm, "EXAMPLE.COM");
        assert_eq!(config.max_concurrent_tasks, 8);
        assert_eq!(config.cluster_memory_mb, 1_048_576.0);
        assert!(config.catalog_file.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("BROKER_LISTEN_ADDR", "0.0.0.0:9000"),
            ("BROKER_KRB_REALM", "CORP.LOCAL"),
            ("BROKER_MAX_CONCURRENT_TASKS", "2"),
            ("BROKER_CATALOG_FILE", "/etc/broker/catalog.json"),
        ])
        .unwrap();
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.orchestrator_settings().krb_realm, "CORP.LOCAL");
        assert_eq!(config.orchestrator_settings().max_concurrent_tasks, 2);
        assert_eq!(
            config.catalog_file,
            Some(PathBuf::from("/etc/broker/catalog.json"))
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(config(&[("BROKER_LISTEN_ADDR", "nope")]).is_err());
        assert!(config(&[("BROKER_MAX_CONCURRENT_TASKS", "0")]).is_err());
        assert!(config(&[("BROKER_CLUSTER_MEMORY_MB", "-5")]).is_err());
    }
}
