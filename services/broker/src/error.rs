//! Broker error taxonomy.

use thiserror::Error;
use yarnbroker_capacity::{CapacityError, Percent};
use yarnbroker_id::IdError;

/// Errors returned by lifecycle operations.
///
/// Everything except `Dependency` is a validation error raised before any
/// work is dispatched. `Dependency` wraps a collaborator failure and is
/// normally observed through a task handle.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Duplicate instance, or an operation is already in flight.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown instance or queue.
    #[error("not found: {0}")]
    NotFound(String),

    /// Request parameter rejected (plan id mismatch, bad quota, bad name).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Requested quota exceeds the unclaimed pool.
    #[error("insufficient capacity: requested {requested}%, available {available}%")]
    InsufficientCapacity {
        requested: Percent,
        available: Percent,
    },

    /// Directory, persistence or cluster-push failure.
    #[error("{context}: {source:#}")]
    Dependency {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

impl BrokerError {
    pub fn dependency(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Dependency {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Adapter for `map_err` on collaborator results.
    pub fn dependency_fn(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::dependency(context, source)
    }

    /// Stable machine-readable code, used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::InsufficientCapacity { .. } => "insufficient_capacity",
            Self::Dependency { .. } => "dependency_failure",
        }
    }
}

impl From<CapacityError> for BrokerError {
    fn from(err: CapacityError) -> Self {
        match err {
            CapacityError::InsufficientCapacity {
                requested,
                available,
            } => Self::InsufficientCapacity {
                requested,
                available,
            },
            CapacityError::QueueNotFound(queue) | CapacityError::QueueRevoked(queue) => {
                Self::NotFound(format!("queue {queue}"))
            }
            e @ (CapacityError::DefaultQueue | CapacityError::InvalidQuota(_)) => {
                Self::InvalidParameter(e.to_string())
            }
            // Anything else means the scheduler configuration we were handed
            // is unusable.
            other => Self::dependency("capacity scheduler configuration", other),
        }
    }
}

impl From<IdError> for BrokerError {
    fn from(err: IdError) -> Self {
        Self::InvalidParameter(err.to_string())
    }
}
