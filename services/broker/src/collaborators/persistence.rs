//! Instance record persistence.
//!
//! The repository is the authority on whether a provision or delete actually
//! landed; the operation registry consults it to classify finished tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use yarnbroker_id::InstanceId;

use crate::instance::ServiceInstance;

/// Instance record store.
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    async fn find_instance(&self, id: &InstanceId) -> Result<Option<ServiceInstance>>;

    /// Inserts or replaces the record.
    async fn save(&self, instance: &ServiceInstance) -> Result<()>;

    /// Stores the record only if none exists for its id. Returns `false`,
    /// leaving the existing record alone, otherwise.
    async fn insert(&self, instance: &ServiceInstance) -> Result<bool>;

    /// Removing an absent record is not an error.
    async fn delete(&self, id: &InstanceId) -> Result<()>;
}

/// In-process repository for development and tests.
#[derive(Default)]
pub struct InMemoryInstanceRepository {
    instances: RwLock<HashMap<InstanceId, ServiceInstance>>,

    /// Whether writes should "fail".
    fail_writes: AtomicBool,
}

impl InMemoryInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `save`/`delete` calls fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("instance store configured to fail");
        }
        Ok(())
    }
}

#[async_trait]
impl InstanceRepository for InMemoryInstanceRepository {
    async fn find_instance(&self, id: &InstanceId) -> Result<Option<ServiceInstance>> {
        Ok(self.instances.read().await.get(id).cloned())
    }

    async fn save(&self, instance: &ServiceInstance) -> Result<()> {
        self.check_writable()?;
        debug!(instance_id = %instance.id, status = ?instance.status, "Saving instance");
        self.instances
            .write()
            .await
            .insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    async fn insert(&self, instance: &ServiceInstance) -> Result<bool> {
        self.check_writable()?;
        let mut instances = self.instances.write().await;
        if instances.contains_key(&instance.id) {
            debug!(instance_id = %instance.id, "Instance already stored");
            return Ok(false);
        }
        debug!(instance_id = %instance.id, status = ?instance.status, "Inserting instance");
        instances.insert(instance.id.clone(), instance.clone());
        Ok(true)
    }

    async fn delete(&self, id: &InstanceId) -> Result<()> {
        self.check_writable()?;
        debug!(instance_id = %id, "Deleting instance");
        self.instances.write().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use yarnbroker_id::{PlanId, QueueName, ServiceId};

    use super::*;

    fn instance(id: &str) -> ServiceInstance {
        ServiceInstance::new(
            InstanceId::parse(id).unwrap(),
            ServiceId::parse("yarn").unwrap(),
            PlanId::parse("yarn-shared").unwrap(),
            QueueName::parse("q1").unwrap(),
            1.0,
        )
    }

    #[tokio::test]
    async fn test_save_find_delete() {
        let repo = InMemoryInstanceRepository::new();
        let inst = instance("a");

        repo.save(&inst).await.unwrap();
        assert_eq!(repo.find_instance(&inst.id).await.unwrap(), Some(inst.clone()));

        repo.delete(&inst.id).await.unwrap();
        assert!(repo.find_instance(&inst.id).await.unwrap().is_none());
        assert!(repo.is_empty().await);

        // Deleting again is fine.
        repo.delete(&inst.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_keeps_existing_record() {
        let repo = InMemoryInstanceRepository::new();
        let first = instance("a");
        assert!(repo.insert(&first).await.unwrap());

        let mut second = instance("a");
        second.quota_gb = 2.0;
        assert!(!repo.insert(&second).await.unwrap());
        assert_eq!(repo.find_instance(&first.id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let repo = InMemoryInstanceRepository::new();
        repo.set_fail_writes(true);
        assert!(repo.save(&instance("a")).await.is_err());
        assert_eq!(repo.len().await, 0);

        repo.set_fail_writes(false);
        repo.save(&instance("a")).await.unwrap();
        assert_eq!(repo.len().await, 1);
    }
}
