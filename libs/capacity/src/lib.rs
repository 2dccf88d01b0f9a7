//! Capacity-scheduler quota allocation.
//!
//! This library owns the in-memory model of a YARN capacity-scheduler
//! configuration and the only code allowed to mutate it. Key concepts:
//!
//! - **Pool**: the `root` queue tree. `root.default` holds every percent not
//!   yet granted to a tenant.
//! - **Tenant queue**: a sibling of `default` sized from a quota in GB.
//! - **Queue mapping**: a `u:<user>:<queue>` token binding a user to a queue.
//!
//! # Invariants
//!
//! - Sibling capacities under `root` always sum to exactly 100.00
//! - A failed allocation leaves the configuration untouched
//! - Percentages are held as integer hundredths, so repeated
//!   allocate/resize/revoke cycles never drift

mod allocator;
mod config;
mod error;
mod mapping;
mod percent;
mod pool;

pub use allocator::QuotaAllocator;
pub use config::{CapacitySchedulerConfig, Queue, PROPERTY_PREFIX, ROOT_QUEUE};
pub use error::CapacityError;
pub use mapping::{QueueMapping, QueueMappings};
pub use percent::Percent;
pub use pool::QuotaPool;
