//! Bookkeeping of in-flight asynchronous operations.
//!
//! The registry holds at most one [`OperationRecord`] per instance. A record
//! lives from dispatch until a poller has been told the outcome; the removal
//! that hands out the outcome happens under the same lock as every insert, so
//! exactly one poller ever sees a given completion.
//!
//! Synchronous requests are recorded too, as foreground operations: they
//! block other operations on the instance like any other record, but their
//! outcome belongs to the waiting request, which removes the record itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use yarnbroker_id::InstanceId;

use super::TaskHandle;
use crate::collaborators::InstanceRepository;
use crate::error::BrokerError;

/// The kind of lifecycle operation in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Provision,
    Delete,
    Update,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::Delete => "delete",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a poller learns about an instance's operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// No operation is tracked, or its outcome was already reported.
    NotFound,
    InProgress { kind: OperationKind },
    Succeeded { kind: OperationKind },
    Failed {
        kind: OperationKind,
        description: String,
    },
}

impl OperationOutcome {
    /// True for `Succeeded` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// A dispatched operation.
#[derive(Debug)]
pub struct OperationRecord {
    pub kind: OperationKind,
    pub handle: TaskHandle<()>,
    pub dispatched_at: DateTime<Utc>,

    /// A request is waiting on this operation; pollers only see it running.
    pub foreground: bool,
}

/// Concurrent map from instance id to its single in-flight operation.
pub struct OperationRegistry {
    records: Mutex<HashMap<InstanceId, OperationRecord>>,

    /// Authority for classifying provision and delete outcomes.
    repository: Arc<dyn InstanceRepository>,
}

impl OperationRegistry {
    pub fn new(repository: Arc<dyn InstanceRepository>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            repository,
        }
    }

    // Nothing panics while the map is held, so a poisoned lock still guards
    // a consistent map.
    fn lock(&self) -> MutexGuard<'_, HashMap<InstanceId, OperationRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records an already-submitted work item.
    ///
    /// Fails with `Conflict` if any operation is already tracked for the
    /// instance. The rejected handle is dropped and its work runs detached;
    /// prefer [`OperationRegistry::dispatch`].
    pub fn register(
        &self,
        instance_id: &InstanceId,
        kind: OperationKind,
        handle: TaskHandle<()>,
    ) -> Result<(), BrokerError> {
        self.dispatch(instance_id, kind, || Ok((handle, ())))
    }

    /// Prepares, submits and records a work item, atomically.
    ///
    /// `spawn` runs under the registry lock and only if the instance has no
    /// tracked operation, so a losing concurrent caller never mutates
    /// anything or starts its work. If `spawn` fails nothing is recorded.
    /// Whatever `spawn` returns beside the handle is passed back.
    pub fn dispatch<T, F>(
        &self,
        instance_id: &InstanceId,
        kind: OperationKind,
        spawn: F,
    ) -> Result<T, BrokerError>
    where
        F: FnOnce() -> Result<(TaskHandle<()>, T), BrokerError>,
    {
        self.insert(instance_id, kind, false, spawn)
    }

    /// Like [`OperationRegistry::dispatch`], for a request that waits on the
    /// work item itself.
    ///
    /// The record stays until the returned guard is completed. If the guard
    /// is dropped first (the request went away), the record falls back to
    /// an ordinary background operation that a poller collects.
    pub fn dispatch_foreground<T, F>(
        &self,
        instance_id: &InstanceId,
        kind: OperationKind,
        spawn: F,
    ) -> Result<(ForegroundOperation<'_>, T), BrokerError>
    where
        F: FnOnce() -> Result<(TaskHandle<()>, T), BrokerError>,
    {
        let output = self.insert(instance_id, kind, true, spawn)?;
        let operation = ForegroundOperation {
            registry: self,
            instance_id: instance_id.clone(),
            completed: false,
        };
        Ok((operation, output))
    }

    fn insert<T, F>(
        &self,
        instance_id: &InstanceId,
        kind: OperationKind,
        foreground: bool,
        spawn: F,
    ) -> Result<T, BrokerError>
    where
        F: FnOnce() -> Result<(TaskHandle<()>, T), BrokerError>,
    {
        let mut records = self.lock();
        if let Some(existing) = records.get(instance_id) {
            return Err(BrokerError::Conflict(format!(
                "instance {instance_id} already has a {} operation in progress",
                existing.kind
            )));
        }

        let (handle, output) = spawn()?;
        records.insert(
            instance_id.clone(),
            OperationRecord {
                kind,
                handle,
                dispatched_at: Utc::now(),
                foreground,
            },
        );
        debug!(instance_id = %instance_id, kind = %kind, foreground, "Operation registered");
        Ok(output)
    }

    /// Kind of the tracked operation, if any. Does not consume the outcome.
    pub fn pending_kind(&self, instance_id: &InstanceId) -> Option<OperationKind> {
        self.lock().get(instance_id).map(|r| r.kind)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Reports the operation's state, handing out a completion exactly once.
    pub async fn poll(&self, instance_id: &InstanceId) -> OperationOutcome {
        let record = {
            let mut records = self.lock();
            match records.get(instance_id) {
                None => return OperationOutcome::NotFound,
                Some(r) if r.foreground || !r.handle.is_done() => {
                    return OperationOutcome::InProgress { kind: r.kind };
                }
                Some(_) => records.remove(instance_id),
            }
        };

        match record {
            Some(record) => self.classify(instance_id, record).await,
            None => OperationOutcome::NotFound,
        }
    }

    async fn classify(&self, instance_id: &InstanceId, record: OperationRecord) -> OperationOutcome {
        let kind = record.kind;
        let task_error = match record.handle.into_outcome() {
            Some(Err(e)) => Some(e.to_string()),
            _ => None,
        };
        let elapsed_ms = (Utc::now() - record.dispatched_at).num_milliseconds();

        let outcome = match kind {
            OperationKind::Update => {
                // Update outcomes are not verified against persistence.
                if let Some(error) = &task_error {
                    warn!(
                        instance_id = %instance_id,
                        error = %error,
                        "Update task failed but is reported as succeeded"
                    );
                }
                OperationOutcome::Succeeded { kind }
            }
            OperationKind::Provision | OperationKind::Delete => {
                match self.repository.find_instance(instance_id).await {
                    Ok(found) => {
                        let exists = found.is_some();
                        let landed = match kind {
                            OperationKind::Provision => exists,
                            _ => !exists,
                        };
                        if landed {
                            OperationOutcome::Succeeded { kind }
                        } else {
                            let reason = if exists {
                                "instance still exists"
                            } else {
                                "instance was not persisted"
                            };
                            OperationOutcome::Failed {
                                kind,
                                description: task_error.unwrap_or_else(|| reason.to_string()),
                            }
                        }
                    }
                    Err(e) => OperationOutcome::Failed {
                        kind,
                        description: format!("failed to look up instance: {e:#}"),
                    },
                }
            }
        };

        info!(
            instance_id = %instance_id,
            kind = %kind,
            elapsed_ms,
            succeeded = matches!(outcome, OperationOutcome::Succeeded { .. }),
            "Operation completed"
        );
        outcome
    }
}

/// A recorded operation whose outcome is handed to the waiting request.
#[must_use = "dropping the guard turns the operation into a background one"]
pub struct ForegroundOperation<'a> {
    registry: &'a OperationRegistry,
    instance_id: InstanceId,
    completed: bool,
}

impl ForegroundOperation<'_> {
    /// Removes the record, returning it.
    pub fn complete(mut self) -> Option<OperationRecord> {
        self.completed = true;
        let record = self.registry.lock().remove(&self.instance_id);
        debug!(instance_id = %self.instance_id, "Foreground operation completed");
        record
    }
}

impl Drop for ForegroundOperation<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if let Some(record) = self.registry.lock().get_mut(&self.instance_id) {
            record.foreground = false;
            warn!(
                instance_id = %self.instance_id,
                kind = %record.kind,
                "Request abandoned its operation, leaving it to pollers"
            );
        }
    }
}
