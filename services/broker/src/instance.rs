//! Service instance records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use yarnbroker_capacity::ROOT_QUEUE;
use yarnbroker_id::{InstanceId, PlanId, QueueName, ServiceId, UserName};

/// Persisted status of an instance. An instance with no record is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Active,
    /// A delete has started but the record has not been removed yet.
    Deleting,
}

/// A provisioned tenant allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: InstanceId,
    pub service_id: ServiceId,
    pub plan_id: PlanId,
    pub status: InstanceStatus,
    pub queue: Option<QueueName>,
    pub quota_gb: f64,
    #[serde(default)]
    pub users: Vec<UserName>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceInstance {
    pub fn new(
        id: InstanceId,
        service_id: ServiceId,
        plan_id: PlanId,
        queue: QueueName,
        quota_gb: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            service_id,
            plan_id,
            status: InstanceStatus::Active,
            queue: Some(queue),
            quota_gb,
            users: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Fully qualified queue path, e.g. `root.<queue>`.
    pub fn queue_path(&self) -> Option<String> {
        self.queue.as_ref().map(|q| format!("{ROOT_QUEUE}.{q}"))
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Where an instance is in its lifecycle, combining the persisted status
/// with any operation still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Absent,
    Provisioning,
    Active,
    Updating,
    Deleting,
}
