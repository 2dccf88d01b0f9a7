//! The capacity-scheduler property model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use yarnbroker_id::QueueName;

use crate::{CapacityError, Percent, QueueMappings};

/// Prefix shared by every capacity-scheduler property.
pub const PROPERTY_PREFIX: &str = "yarn.scheduler.capacity.";

/// Parent of all tenant queues.
pub const ROOT_QUEUE: &str = "root";

const CAPACITY: &str = "capacity";
const MAXIMUM_CAPACITY: &str = "maximum-capacity";
const QUEUES: &str = "queues";
const QUEUE_MAPPINGS: &str = "queue-mappings";

/// Logical view of one queue's capacity entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queue {
    pub name: QueueName,
    pub capacity: Percent,
    pub maximum_capacity: Percent,
}

impl Queue {
    /// A zeroed queue can be handed to the next tenant.
    pub fn is_empty(&self) -> bool {
        self.capacity.is_zero() && self.maximum_capacity.is_zero()
    }
}

/// Flat `yarn.scheduler.capacity.*` property map.
///
/// Read access is public; mutation is reserved to the allocator so the pool
/// invariants are maintained in one place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapacitySchedulerConfig {
    properties: BTreeMap<String, String>,
}

impl CapacitySchedulerConfig {
    pub fn from_properties<I, K, V>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// `yarn.scheduler.capacity.root.<queue>.<field>`
    pub fn queue_key(queue: &str, field: &str) -> String {
        format!("{PROPERTY_PREFIX}{ROOT_QUEUE}.{queue}.{field}")
    }

    fn root_key(field: &str) -> String {
        format!("{PROPERTY_PREFIX}{ROOT_QUEUE}.{field}")
    }

    fn mappings_key() -> String {
        format!("{PROPERTY_PREFIX}{QUEUE_MAPPINGS}")
    }

    fn percent(&self, key: &str) -> Result<Option<Percent>, CapacityError> {
        match self.properties.get(key) {
            None => Ok(None),
            Some(value) => Percent::parse(value).map(Some).ok_or_else(|| {
                CapacityError::InvalidPercentage {
                    key: key.to_string(),
                    value: value.clone(),
                }
            }),
        }
    }

    /// Capacity still held by `root.default`, i.e. the unclaimed pool.
    pub fn default_capacity(&self) -> Result<Percent, CapacityError> {
        let key = Self::queue_key(QueueName::DEFAULT, CAPACITY);
        self.percent(&key)?
            .ok_or(CapacityError::MissingProperty(key))
    }

    /// Children of `root` in declared order. Includes `default`.
    pub fn sibling_queues(&self) -> Result<Vec<QueueName>, CapacityError> {
        let Some(list) = self.get(&Self::root_key(QUEUES)) else {
            return Ok(Vec::new());
        };
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                QueueName::parse(name).map_err(|source| CapacityError::InvalidQueueName {
                    value: name.to_string(),
                    source,
                })
            })
            .collect()
    }

    /// Returns `None` if the queue has no capacity entry.
    ///
    /// A missing `maximum-capacity` means "unbounded" to YARN and is read as
    /// 100.00.
    pub fn queue(&self, name: &QueueName) -> Result<Option<Queue>, CapacityError> {
        let Some(capacity) = self.percent(&Self::queue_key(name.as_str(), CAPACITY))? else {
            return Ok(None);
        };
        let maximum_capacity = self
            .percent(&Self::queue_key(name.as_str(), MAXIMUM_CAPACITY))?
            .unwrap_or(Percent::HUNDRED);
        Ok(Some(Queue {
            name: name.clone(),
            capacity,
            maximum_capacity,
        }))
    }

    /// Tenant queues, i.e. every sibling except `default`, in declared order.
    pub fn tenant_queues(&self) -> Result<Vec<Queue>, CapacityError> {
        let mut queues = Vec::new();
        for name in self.sibling_queues()? {
            if name.is_default() {
                continue;
            }
            if let Some(queue) = self.queue(&name)? {
                queues.push(queue);
            }
        }
        Ok(queues)
    }

    pub fn queue_mappings(&self) -> QueueMappings {
        self.get(&Self::mappings_key())
            .map(QueueMappings::parse)
            .unwrap_or_default()
    }

    /// Sum of the capacities of every child of `root`, `default` included
    /// even when the queue list omits it.
    pub fn sibling_capacity_sum(&self) -> Result<Percent, CapacityError> {
        let siblings = self.sibling_queues()?;
        let mut sum = self.default_capacity()?;
        for name in siblings.iter().filter(|n| !n.is_default()) {
            if let Some(queue) = self.queue(name)? {
                sum += queue.capacity;
            }
        }
        Ok(sum)
    }

    /// Verifies the pool invariant: sibling capacities sum to 100.00.
    pub fn check_invariant(&self) -> Result<(), CapacityError> {
        let sum = self.sibling_capacity_sum()?;
        if sum == Percent::HUNDRED {
            Ok(())
        } else {
            Err(CapacityError::InvariantViolated { sum })
        }
    }

    // -------------------------------------------------------------------------
    // Mutation (allocator only)
    // -------------------------------------------------------------------------

    pub(crate) fn set_queue_capacity(&mut self, name: &str, capacity: Percent) {
        let value = capacity.to_string();
        self.properties
            .insert(Self::queue_key(name, CAPACITY), value.clone());
        self.properties
            .insert(Self::queue_key(name, MAXIMUM_CAPACITY), value);
    }

    pub(crate) fn set_default_capacity(&mut self, capacity: Percent) {
        self.set_queue_capacity(QueueName::DEFAULT, capacity);
    }

    pub(crate) fn append_sibling(&mut self, name: &QueueName) {
        let key = Self::root_key(QUEUES);
        let list = match self.properties.get(&key) {
            Some(existing) if !existing.trim().is_empty() => format!("{existing},{name}"),
            _ => name.to_string(),
        };
        self.properties.insert(key, list);
    }

    pub(crate) fn set_queue_mappings(&mut self, mappings: &QueueMappings) {
        self.properties
            .insert(Self::mappings_key(), mappings.to_string());
    }
}
