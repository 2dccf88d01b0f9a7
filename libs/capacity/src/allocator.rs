//! Quota allocation over a capacity-scheduler configuration.

use tracing::debug;
use yarnbroker_id::{QueueName, UserName};

use crate::{CapacityError, CapacitySchedulerConfig, Percent, QueueMapping};

/// Grants, resizes and revokes tenant queues.
///
/// Every operation validates and computes first and mutates last, so an
/// error never leaves a half-applied change behind. The allocator is not
/// synchronized; share it through [`crate::QuotaPool`].
#[derive(Debug, Clone)]
pub struct QuotaAllocator {
    config: CapacitySchedulerConfig,
    total_memory_mb: f64,
}

impl QuotaAllocator {
    /// Wraps a configuration loaded from the cluster.
    ///
    /// `total_memory_mb` is the cluster-wide memory the percentages are a
    /// share of. Fails if the pool queue has no readable capacity.
    pub fn new(
        total_memory_mb: f64,
        config: CapacitySchedulerConfig,
    ) -> Result<Self, CapacityError> {
        if !(total_memory_mb.is_finite() && total_memory_mb > 0.0) {
            return Err(CapacityError::InvalidTotalMemory(total_memory_mb));
        }
        config.default_capacity()?;
        Ok(Self {
            config,
            total_memory_mb,
        })
    }

    pub fn config(&self) -> &CapacitySchedulerConfig {
        &self.config
    }

    pub fn into_config(self) -> CapacitySchedulerConfig {
        self.config
    }

    pub fn total_memory_mb(&self) -> f64 {
        self.total_memory_mb
    }

    /// The unclaimed share of the pool, held by `root.default`.
    pub fn available_capacity(&self) -> Result<Percent, CapacityError> {
        self.config.default_capacity()
    }

    /// Percentage of the pool a quota in GB maps to.
    pub fn target_capacity(&self, quota_gb: f64) -> Result<Percent, CapacityError> {
        if !(quota_gb.is_finite() && quota_gb > 0.0) {
            return Err(CapacityError::InvalidQuota(quota_gb));
        }
        // A share that rounds to 0.00 would look like a free queue.
        Percent::from_quota(quota_gb, self.total_memory_mb)
            .filter(|p| !p.is_zero())
            .ok_or(CapacityError::InvalidQuota(quota_gb))
    }

    /// Grants a queue sized for `quota_gb`, reusing the first zeroed sibling
    /// or creating a new one.
    pub fn allocate(&mut self, quota_gb: f64) -> Result<QueueName, CapacityError> {
        let target = self.target_capacity(quota_gb)?;
        let available = self.available_capacity()?;
        if target > available {
            return Err(CapacityError::InsufficientCapacity {
                requested: target,
                available,
            });
        }

        let reusable = self.first_empty_queue()?;
        let queue = match reusable {
            Some(name) => name,
            None => {
                let name = QueueName::generate();
                self.config.append_sibling(&name);
                name
            }
        };

        self.config.set_queue_capacity(queue.as_str(), target);
        self.config.set_default_capacity(available - target);

        debug!(
            queue = %queue,
            capacity = %target,
            remaining = %(available - target),
            "Allocated queue"
        );
        Ok(queue)
    }

    /// Re-sizes a granted queue to `new_quota_gb`, moving the difference
    /// to or from the pool. Returns the new capacity.
    ///
    /// A zeroed queue has been revoked and can only come back through
    /// [`QuotaAllocator::allocate`].
    pub fn resize(
        &mut self,
        queue: &QueueName,
        new_quota_gb: f64,
    ) -> Result<Percent, CapacityError> {
        if queue.is_default() {
            return Err(CapacityError::DefaultQueue);
        }
        let target = self.target_capacity(new_quota_gb)?;
        let origin = self
            .config
            .queue(queue)?
            .ok_or_else(|| CapacityError::QueueNotFound(queue.clone()))?
            .capacity;
        if origin.is_zero() {
            return Err(CapacityError::QueueRevoked(queue.clone()));
        }
        let available = self.available_capacity()?;
        let growth = target - origin;
        if growth > available {
            return Err(CapacityError::InsufficientCapacity {
                requested: growth,
                available,
            });
        }

        self.config.set_queue_capacity(queue.as_str(), target);
        self.config.set_default_capacity(available - growth);

        debug!(queue = %queue, from = %origin, to = %target, "Resized queue");
        Ok(target)
    }

    /// Zeroes a queue and returns its share to the pool.
    ///
    /// Returns `false` if the queue has no capacity entry, so revoking twice
    /// is harmless.
    pub fn revoke(&mut self, queue: &QueueName) -> Result<bool, CapacityError> {
        if queue.is_default() {
            return Err(CapacityError::DefaultQueue);
        }
        let Some(current) = self.config.queue(queue)? else {
            return Ok(false);
        };
        let available = self.available_capacity()?;

        self.config.set_queue_capacity(queue.as_str(), Percent::ZERO);
        self.config
            .set_default_capacity(available + current.capacity);

        debug!(queue = %queue, released = %current.capacity, "Revoked queue");
        Ok(true)
    }

    /// Binds `user` to `queue`. Returns the full `queue-mappings` value.
    pub fn add_queue_mapping(&mut self, user: &UserName, queue: &QueueName) -> String {
        let mut mappings = self.config.queue_mappings();
        mappings.add(&QueueMapping::new(user.clone(), queue.clone()));
        self.config.set_queue_mappings(&mappings);
        mappings.to_string()
    }

    /// Unbinds one user from `queue`, keeping every other token.
    pub fn remove_queue_mapping(&mut self, user: &UserName, queue: &QueueName) -> String {
        let mut mappings = self.config.queue_mappings();
        mappings.remove(Some(user), queue);
        self.config.set_queue_mappings(&mappings);
        mappings.to_string()
    }

    /// Unbinds every user from `queue`.
    pub fn remove_queue_mappings(&mut self, queue: &QueueName) -> String {
        let mut mappings = self.config.queue_mappings();
        mappings.remove(None, queue);
        self.config.set_queue_mappings(&mappings);
        mappings.to_string()
    }

    fn first_empty_queue(&self) -> Result<Option<QueueName>, CapacityError> {
        for name in self.config.sibling_queues()? {
            if name.is_default() {
                continue;
            }
            if self.config.queue(&name)?.is_some_and(|q| q.is_empty()) {
                return Ok(Some(name));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    /// 1024 GB of cluster memory.
    const TOTAL_MB: f64 = 1024.0 * 1024.0;

    fn pool_with_default(default: &str) -> CapacitySchedulerConfig {
        CapacitySchedulerConfig::from_properties([
            ("yarn.scheduler.capacity.root.queues", "default"),
            ("yarn.scheduler.capacity.root.default.capacity", default),
            ("yarn.scheduler.capacity.root.default.maximum-capacity", default),
        ])
    }

    fn allocator() -> QuotaAllocator {
        QuotaAllocator::new(TOTAL_MB, pool_with_default("100")).unwrap()
    }

    fn capacity(a: &QuotaAllocator, q: &QueueName) -> Percent {
        a.config().queue(q).unwrap().unwrap().capacity
    }

    fn user(s: &str) -> UserName {
        UserName::parse(s).unwrap()
    }

    #[test]
    fn test_new_requires_default_capacity() {
        let err = QuotaAllocator::new(TOTAL_MB, CapacitySchedulerConfig::default()).unwrap_err();
        assert!(matches!(err, CapacityError::MissingProperty(_)));
    }

    #[rstest]
    #[case(0.0)]
    #[case(-1.0)]
    #[case(f64::NAN)]
    fn test_new_rejects_bad_total_memory(#[case] total: f64) {
        assert!(matches!(
            QuotaAllocator::new(total, pool_with_default("100")),
            Err(CapacityError::InvalidTotalMemory(_))
        ));
    }

    #[test]
    fn test_allocate_then_revoke_scenario() {
        let mut a = allocator();

        let queue = a.allocate(102.4).unwrap();
        assert_eq!(capacity(&a, &queue).to_string(), "10.00");
        assert_eq!(a.available_capacity().unwrap().to_string(), "90.00");
        assert_eq!(
            a.config()
                .get("yarn.scheduler.capacity.root.default.maximum-capacity"),
            Some("90.00")
        );
        assert_eq!(
            a.config().get(&CapacitySchedulerConfig::queue_key(
                queue.as_str(),
                "maximum-capacity"
            )),
            Some("10.00")
        );
        a.config().check_invariant().unwrap();

        assert!(a.revoke(&queue).unwrap());
        assert_eq!(a.available_capacity().unwrap(), Percent::HUNDRED);
        assert!(a.config().queue(&queue).unwrap().unwrap().is_empty());
        a.config().check_invariant().unwrap();
    }

    #[test]
    fn test_allocate_insufficient_leaves_config_unchanged() {
        let mut a = QuotaAllocator::new(TOTAL_MB, pool_with_default("5.00")).unwrap();
        let before = a.config().clone();

        match a.allocate(1024.0) {
            Err(CapacityError::InsufficientCapacity {
                requested,
                available,
            }) => {
                assert_eq!(requested, Percent::HUNDRED);
                assert_eq!(available, Percent::from_hundredths(500));
            }
            other => panic!("expected insufficient capacity, got {other:?}"),
        }
        assert_eq!(a.config(), &before);
    }

    #[test]
    fn test_allocate_exact_fit() {
        let mut a = allocator();
        let queue = a.allocate(1024.0).unwrap();
        assert_eq!(capacity(&a, &queue), Percent::HUNDRED);
        assert_eq!(a.available_capacity().unwrap(), Percent::ZERO);
        // The exhausted pool queue must never be picked as a reusable queue.
        assert!(a.allocate(1.0).is_err());
    }

    #[rstest]
    #[case(0.0)]
    #[case(-10.0)]
    #[case(f64::INFINITY)]
    #[case(0.001)]
    fn test_allocate_rejects_bad_quota(#[case] quota: f64) {
        let mut a = allocator();
        assert!(matches!(
            a.allocate(quota),
            Err(CapacityError::InvalidQuota(_))
        ));
    }

    #[test]
    fn test_revoked_queue_is_reused() {
        let mut a = allocator();
        let first = a.allocate(204.8).unwrap();
        let second = a.allocate(102.4).unwrap();
        assert_ne!(first, second);

        a.revoke(&first).unwrap();
        let reused = a.allocate(51.2).unwrap();
        assert_eq!(reused, first);
        assert_eq!(capacity(&a, &reused).to_string(), "5.00");
        assert_eq!(a.config().sibling_queues().unwrap().len(), 3);
        a.config().check_invariant().unwrap();
    }

    #[test]
    fn test_resize_of_revoked_queue_is_refused() {
        let mut a = allocator();
        let queue = a.allocate(102.4).unwrap();
        a.revoke(&queue).unwrap();
        let before = a.config().clone();

        assert!(matches!(
            a.resize(&queue, 51.2),
            Err(CapacityError::QueueRevoked(q)) if q == queue
        ));
        assert_eq!(a.config(), &before);
        assert_eq!(a.available_capacity().unwrap(), Percent::HUNDRED);
    }

    #[test]
    fn test_new_queue_is_appended_to_siblings() {
        let mut a = allocator();
        let queue = a.allocate(10.24).unwrap();
        let siblings = a.config().sibling_queues().unwrap();
        assert_eq!(siblings.last(), Some(&queue));
        assert!(siblings[0].is_default());
    }

    #[test]
    fn test_resize_touches_only_target_and_default() {
        let mut a = allocator();
        let q1 = a.allocate(102.4).unwrap();
        let q2 = a.allocate(204.8).unwrap();
        let q2_before = capacity(&a, &q2);

        let new = a.resize(&q1, 307.2).unwrap();
        assert_eq!(new.to_string(), "30.00");
        assert_eq!(capacity(&a, &q1), new);
        assert_eq!(capacity(&a, &q2), q2_before);
        assert_eq!(a.available_capacity().unwrap().to_string(), "50.00");
        a.config().check_invariant().unwrap();

        a.resize(&q1, 10.24).unwrap();
        assert_eq!(a.available_capacity().unwrap().to_string(), "79.00");
        a.config().check_invariant().unwrap();
    }

    #[test]
    fn test_resize_unknown_queue() {
        let mut a = allocator();
        let missing = QueueName::parse("missing").unwrap();
        assert!(matches!(
            a.resize(&missing, 1.0),
            Err(CapacityError::QueueNotFound(q)) if q == missing
        ));
    }

    #[test]
    fn test_resize_beyond_pool_is_rejected() {
        let mut a = allocator();
        let q = a.allocate(512.0).unwrap();
        let before = a.config().clone();
        assert!(matches!(
            a.resize(&q, 2048.0),
            Err(CapacityError::InsufficientCapacity { .. })
        ));
        assert_eq!(a.config(), &before);
    }

    #[test]
    fn test_default_queue_is_protected() {
        let mut a = allocator();
        let default = QueueName::parse("default").unwrap();
        assert!(matches!(a.revoke(&default), Err(CapacityError::DefaultQueue)));
        assert!(matches!(
            a.resize(&default, 1.0),
            Err(CapacityError::DefaultQueue)
        ));
    }

    #[test]
    fn test_revoke_unknown_queue_is_noop() {
        let mut a = allocator();
        let before = a.config().clone();
        assert!(!a.revoke(&QueueName::parse("ghost").unwrap()).unwrap());
        assert_eq!(a.config(), &before);
    }

    #[test]
    fn test_double_revoke() {
        let mut a = allocator();
        let q = a.allocate(102.4).unwrap();
        assert!(a.revoke(&q).unwrap());
        a.revoke(&q).unwrap();
        assert_eq!(a.available_capacity().unwrap(), Percent::HUNDRED);
    }

    #[test]
    fn test_queue_mappings() {
        let mut a = allocator();
        let q1 = a.allocate(10.24).unwrap();
        let q2 = a.allocate(10.24).unwrap();

        a.add_queue_mapping(&user("alice"), &q1);
        a.add_queue_mapping(&user("bob"), &q1);
        let all = a.add_queue_mapping(&user("alice"), &q2);
        assert_eq!(all, format!("u:alice:{q1},u:bob:{q1},u:alice:{q2}"));

        let after = a.remove_queue_mapping(&user("alice"), &q1);
        assert_eq!(after, format!("u:bob:{q1},u:alice:{q2}"));

        let after = a.remove_queue_mappings(&q2);
        assert_eq!(after, format!("u:bob:{q1}"));
        assert_eq!(
            a.config().get("yarn.scheduler.capacity.queue-mappings"),
            Some(after.as_str())
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Allocate(u32),
        Resize(usize, u32),
        Revoke(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u32..3000).prop_map(Op::Allocate),
            (0usize..8, 1u32..3000).prop_map(|(i, q)| Op::Resize(i, q)),
            (0usize..8).prop_map(Op::Revoke),
        ]
    }

    proptest! {
        #[test]
        fn prop_pool_always_sums_to_hundred(ops in prop::collection::vec(op(), 1..40)) {
            // 300 GB cluster so quotas land on awkward fractions.
            let mut a = QuotaAllocator::new(300.0 * 1024.0, pool_with_default("100")).unwrap();
            let mut granted: Vec<QueueName> = Vec::new();

            for op in ops {
                let before = a.config().clone();
                let result = match op {
                    Op::Allocate(tenths) => a.allocate(f64::from(tenths) / 10.0).map(|q| {
                        if !granted.contains(&q) {
                            granted.push(q);
                        }
                    }),
                    Op::Resize(i, tenths) if !granted.is_empty() => {
                        let q = granted[i % granted.len()].clone();
                        a.resize(&q, f64::from(tenths) / 10.0).map(|_| ())
                    }
                    Op::Revoke(i) if !granted.is_empty() => {
                        let q = granted[i % granted.len()].clone();
                        a.revoke(&q).map(|_| ())
                    }
                    _ => Ok(()),
                };

                if result.is_err() {
                    prop_assert_eq!(a.config(), &before);
                }
                prop_assert!(a.config().check_invariant().is_ok());
                prop_assert!(a.available_capacity().unwrap() >= Percent::ZERO);
            }
        }
    }
}
