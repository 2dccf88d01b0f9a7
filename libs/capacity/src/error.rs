//! Capacity allocation errors.

use thiserror::Error;
use yarnbroker_id::{IdError, QueueName};

use crate::Percent;

/// Errors raised while reading or mutating a scheduler configuration.
#[derive(Debug, Error)]
pub enum CapacityError {
    /// The requested quota does not fit in the unclaimed pool.
    #[error("insufficient capacity: requested {requested}%, available {available}%")]
    InsufficientCapacity {
        requested: Percent,
        available: Percent,
    },

    /// The queue has no capacity entry.
    #[error("queue not found: {0}")]
    QueueNotFound(QueueName),

    /// The queue was revoked and is free for reuse, not owned by anyone.
    #[error("queue has been revoked: {0}")]
    QueueRevoked(QueueName),

    /// The shared pool queue cannot be resized or revoked directly.
    #[error("the default queue cannot be used as a tenant queue")]
    DefaultQueue,

    /// Quotas must be positive and finite.
    #[error("invalid quota: {0} GB")]
    InvalidQuota(f64),

    /// The cluster memory denominator must be positive and finite.
    #[error("invalid total memory: {0} MB")]
    InvalidTotalMemory(f64),

    /// A required property is missing from the configuration.
    #[error("missing property: {0}")]
    MissingProperty(String),

    /// A capacity property does not hold a number.
    #[error("invalid percentage in {key}: {value:?}")]
    InvalidPercentage { key: String, value: String },

    /// A name in the queue list is not a valid queue name.
    #[error("invalid queue name {value:?}: {source}")]
    InvalidQueueName {
        value: String,
        #[source]
        source: IdError,
    },

    /// Sibling capacities no longer sum to 100.
    #[error("sibling capacities sum to {sum}%, expected 100.00%")]
    InvariantViolated { sum: Percent },
}
