//! Mutex-guarded access to a shared allocator.

use std::sync::{Mutex, MutexGuard, PoisonError};

use yarnbroker_id::{QueueName, UserName};

use crate::{CapacityError, CapacitySchedulerConfig, Percent, QuotaAllocator};

/// One lock per scheduler configuration.
///
/// Each call is a complete read-modify-write of the pool; concurrent callers
/// are serialized so `root.default` can never be updated from a stale read.
/// Use [`QuotaPool::with_allocator`] when several steps must be atomic
/// together.
#[derive(Debug)]
pub struct QuotaPool {
    inner: Mutex<QuotaAllocator>,
}

impl QuotaPool {
    pub fn new(allocator: QuotaAllocator) -> Self {
        Self {
            inner: Mutex::new(allocator),
        }
    }

    // Allocator methods compute before they mutate, so a panic while the
    // lock is held cannot leave a half-written pool behind.
    fn lock(&self) -> MutexGuard<'_, QuotaAllocator> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_allocator<R>(&self, f: impl FnOnce(&mut QuotaAllocator) -> R) -> R {
        f(&mut self.lock())
    }

    /// A consistent copy of the configuration, for pushing to the cluster.
    pub fn snapshot(&self) -> CapacitySchedulerConfig {
        self.lock().config().clone()
    }

    pub fn available_capacity(&self) -> Result<Percent, CapacityError> {
        self.lock().available_capacity()
    }

    pub fn allocate(&self, quota_gb: f64) -> Result<QueueName, CapacityError> {
        self.lock().allocate(quota_gb)
    }

    pub fn resize(&self, queue: &QueueName, new_quota_gb: f64) -> Result<Percent, CapacityError> {
        self.lock().resize(queue, new_quota_gb)
    }

    pub fn revoke(&self, queue: &QueueName) -> Result<bool, CapacityError> {
        self.lock().revoke(queue)
    }

    pub fn add_queue_mapping(&self, user: &UserName, queue: &QueueName) -> String {
        self.lock().add_queue_mapping(user, queue)
    }

    pub fn remove_queue_mapping(&self, user: &UserName, queue: &QueueName) -> String {
        self.lock().remove_queue_mapping(user, queue)
    }

    pub fn remove_queue_mappings(&self, queue: &QueueName) -> String {
        self.lock().remove_queue_mappings(queue)
    }
}
