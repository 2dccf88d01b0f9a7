//! Cluster-admin interface and an in-process implementation.
//!
//! The broker never edits the cluster piecemeal: every work item pushes a
//! complete capacity-scheduler snapshot, so the latest successful push always
//! reflects the allocator's state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use yarnbroker_capacity::CapacitySchedulerConfig;

/// Cluster-admin API (Ambari-style) used to read and apply scheduler config.
#[async_trait]
pub trait ClusterAdmin: Send + Sync {
    /// Cluster-wide memory in MB, the denominator of every queue share.
    async fn total_memory_mb(&self) -> Result<f64>;

    async fn load_scheduler_config(&self) -> Result<CapacitySchedulerConfig>;

    /// Replace the cluster's capacity-scheduler configuration.
    async fn apply_scheduler_config(&self, config: &CapacitySchedulerConfig) -> Result<()>;
}

/// In-process cluster for development and tests.
pub struct StaticCluster {
    total_memory_mb: f64,

    /// Last configuration successfully applied.
    applied: RwLock<CapacitySchedulerConfig>,

    /// Number of successful applies.
    apply_count: AtomicU64,

    /// Whether applies should "fail".
    fail_applies: AtomicBool,

    /// Simulated latency of an apply.
    apply_delay: Duration,
}

impl StaticCluster {
    pub fn new(total_memory_mb: f64, config: CapacitySchedulerConfig) -> Self {
        Self {
            total_memory_mb,
            applied: RwLock::new(config),
            apply_count: AtomicU64::new(0),
            fail_applies: AtomicBool::new(false),
            apply_delay: Duration::ZERO,
        }
    }

    /// A cluster whose whole pool still sits in `root.default`.
    pub fn with_empty_pool(total_memory_mb: f64) -> Self {
        Self::new(
            total_memory_mb,
            CapacitySchedulerConfig::from_properties([
                ("yarn.scheduler.capacity.root.queues", "default"),
                ("yarn.scheduler.capacity.root.default.capacity", "100.00"),
                ("yarn.scheduler.capacity.root.default.maximum-capacity", "100.00"),
                ("yarn.scheduler.capacity.queue-mappings", ""),
            ]),
        )
    }

    /// Delay every apply, so tests can observe in-progress operations.
    pub fn with_apply_delay(mut self, delay: Duration) -> Self {
        self.apply_delay = delay;
        self
    }

    pub fn set_fail_applies(&self, fail: bool) {
        self.fail_applies.store(fail, Ordering::SeqCst);
    }

    pub async fn applied(&self) -> CapacitySchedulerConfig {
        self.applied.read().await.clone()
    }

    pub fn apply_count(&self) -> u64 {
        self.apply_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterAdmin for StaticCluster {
    async fn total_memory_mb(&self) -> Result<f64> {
        Ok(self.total_memory_mb)
    }

    async fn load_scheduler_config(&self) -> Result<CapacitySchedulerConfig> {
        Ok(self.applied.read().await.clone())
    }

    async fn apply_scheduler_config(&self, config: &CapacitySchedulerConfig) -> Result<()> {
        if !self.apply_delay.is_zero() {
            tokio::time::sleep(self.apply_delay).await;
        }
        if self.fail_applies.load(Ordering::SeqCst) {
            anyhow::bail!("cluster configured to reject scheduler updates");
        }

        info!(
            properties = config.properties().len(),
            "[STATIC] Applying capacity-scheduler configuration"
        );
        *self.applied.write().await = config.clone();
        let count = self.apply_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(apply_count = count, "[STATIC] Configuration applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_apply_replaces_config() {
        let cluster = StaticCluster::with_empty_pool(1024.0);
        let loaded = cluster.load_scheduler_config().await.unwrap();
        assert_eq!(
            loaded.default_capacity().unwrap().to_string(),
            "100.00"
        );

        let next = CapacitySchedulerConfig::from_properties([(
            "yarn.scheduler.capacity.root.default.capacity",
            "90.00",
        )]);
        cluster.apply_scheduler_config(&next).await.unwrap();
        assert_eq!(cluster.applied().await, next);
        assert_eq!(cluster.apply_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_apply_keeps_previous_config() {
        let cluster = StaticCluster::with_empty_pool(1024.0);
        let before = cluster.applied().await;
        cluster.set_fail_applies(true);

        let next = CapacitySchedulerConfig::default();
        assert!(cluster.apply_scheduler_config(&next).await.is_err());
        assert_eq!(cluster.applied().await, before);
        assert_eq!(cluster.apply_count(), 0);
    }
}
