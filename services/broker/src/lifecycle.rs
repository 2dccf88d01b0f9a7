//! Instance lifecycle: create, update, delete and poll.
//!
//! Each request is validated and its quota change is computed synchronously,
//! so capacity and state errors surface on the request itself. The slow part
//! (pushing the scheduler snapshot, persistence, credentials) runs as a work
//! item on the [`TaskRunner`] and is tracked by the [`OperationRegistry`].
//!
//! ```text
//! Absent -> Provisioning -> Active -> Updating -> Active -> Deleting -> Absent
//! ```
//!
//! Provisioning, Updating and Deleting each correspond to one registry
//! record; a second request while one is live fails with `Conflict`.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;
use yarnbroker_capacity::{QueueMapping, QuotaAllocator, QuotaPool};
use yarnbroker_id::{InstanceId, PlanId, QueueName, ServiceId, UserName};

use crate::catalog::Catalog;
use crate::collaborators::{password_path, Collaborators};
use crate::error::BrokerError;
use crate::instance::{InstanceStatus, LifecycleState, ServiceInstance};
use crate::operations::{
    OperationKind, OperationOutcome, OperationRegistry, TaskRunner, TaskRunnerConfig,
    DEFAULT_MAX_CONCURRENT_TASKS,
};

/// Deployment-specific settings of the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Kerberos realm tenant principals live in.
    pub krb_realm: String,

    /// Resource manager endpoint handed out in credentials.
    pub resource_manager_url: String,

    pub max_concurrent_tasks: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            krb_realm: "EXAMPLE.COM".to_string(),
            resource_manager_url: "http://localhost:8088".to_string(),
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

/// Optional create parameters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProvisionParameters {
    /// Queue size in GB; the plan default when absent.
    #[serde(default)]
    pub queue_quota_gb: Option<f64>,
}

/// Optional update parameters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdateParameters {
    /// Directory user to bind to the instance's queue.
    #[serde(default)]
    pub user_name: Option<UserName>,

    /// New queue size in GB.
    #[serde(default)]
    pub queue_quota_gb: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub instance_id: InstanceId,
    pub service_id: ServiceId,
    pub plan_id: PlanId,
    pub accepts_incomplete: bool,
    pub parameters: ProvisionParameters,
}

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub instance_id: InstanceId,
    /// When present, must match the instance's plan.
    pub plan_id: Option<PlanId>,
    pub accepts_incomplete: bool,
    pub parameters: UpdateParameters,
}

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub instance_id: InstanceId,
    pub service_id: ServiceId,
    pub plan_id: PlanId,
    pub accepts_incomplete: bool,
}

/// Whether the request finished or was accepted for background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The work item ran to completion before the response.
    Completed,
    /// The work item is running; poll `last_operation`.
    Accepted,
}

/// What a tenant needs to submit jobs to its queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    /// Fully qualified queue path, `root.<queue>`.
    pub yarn_queue: String,
    pub resource_manager_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResponse {
    pub completion: Completion,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateResponse {
    pub completion: Completion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResponse {
    pub completion: Completion,
}

/// Composes the quota pool, task runner, registry and collaborators.
pub struct LifecycleOrchestrator {
    catalog: Catalog,
    pool: Arc<QuotaPool>,
    runner: TaskRunner,
    registry: OperationRegistry,
    collaborators: Collaborators,
    settings: OrchestratorSettings,

    /// Serializes snapshot pushes so the cluster never receives an older
    /// snapshot after a newer one.
    push_lock: Arc<Mutex<()>>,
}

impl LifecycleOrchestrator {
    pub fn new(
        catalog: Catalog,
        pool: Arc<QuotaPool>,
        collaborators: Collaborators,
        settings: OrchestratorSettings,
    ) -> Self {
        let runner = TaskRunner::new(TaskRunnerConfig {
            max_concurrent: settings.max_concurrent_tasks,
        });
        let registry = OperationRegistry::new(Arc::clone(&collaborators.repository));
        Self {
            catalog,
            pool,
            runner,
            registry,
            collaborators,
            settings,
            push_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Builds the quota pool from the cluster's current scheduler
    /// configuration.
    pub async fn bootstrap(
        catalog: Catalog,
        collaborators: Collaborators,
        settings: OrchestratorSettings,
    ) -> Result<Self, BrokerError> {
        let cluster = &collaborators.cluster;
        let total_memory_mb = cluster
            .total_memory_mb()
            .await
            .map_err(BrokerError::dependency_fn("read cluster memory"))?;
        let config = cluster
            .load_scheduler_config()
            .await
            .map_err(BrokerError::dependency_fn("load scheduler config"))?;

        if let Err(e) = config.check_invariant() {
            warn!(error = %e, "Loaded scheduler configuration is unbalanced");
        }
        let allocator = QuotaAllocator::new(total_memory_mb, config)?;
        info!(
            total_memory_mb,
            available = %allocator.available_capacity()?,
            "Quota pool loaded"
        );

        Ok(Self::new(
            catalog,
            Arc::new(QuotaPool::new(allocator)),
            collaborators,
            settings,
        ))
    }

    pub fn pool(&self) -> &QuotaPool {
        &self.pool
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Provisions a new instance with its own queue.
    #[instrument(skip(self, request), fields(instance_id = %request.instance_id))]
    pub async fn create(&self, request: CreateRequest) -> Result<CreateResponse, BrokerError> {
        let CreateRequest {
            instance_id,
            service_id,
            plan_id,
            accepts_incomplete,
            parameters,
        } = request;

        if self.find(&instance_id).await?.is_some() {
            return Err(BrokerError::Conflict(format!(
                "instance {instance_id} already exists"
            )));
        }
        let entry = self.catalog.plan(&service_id, &plan_id).ok_or_else(|| {
            BrokerError::InvalidParameter(format!(
                "plan {plan_id} is not offered by service {service_id}"
            ))
        })?;
        self.ensure_idle(&instance_id)?;

        let quota_gb = parameters.queue_quota_gb.unwrap_or(entry.default_quota_gb);
        let (completion, queue) = self
            .run(&instance_id, OperationKind::Provision, accepts_incomplete, || {
                let queue = self.pool.allocate(quota_gb)?;
                info!(queue = %queue, quota_gb, "Queue allocated");

                let instance = ServiceInstance::new(
                    instance_id.clone(),
                    service_id,
                    plan_id,
                    queue.clone(),
                    quota_gb,
                );
                let work = self
                    .work_context()
                    .provision(instance)
                    .instrument(info_span!("provision", instance_id = %instance_id));
                Ok((work, queue))
            })
            .await?;

        Ok(CreateResponse {
            completion,
            credentials: self.credentials(&queue),
        })
    }

    /// Binds a user to the instance's queue and/or resizes the queue.
    #[instrument(skip(self, request), fields(instance_id = %request.instance_id))]
    pub async fn update(&self, request: UpdateRequest) -> Result<UpdateResponse, BrokerError> {
        let UpdateRequest {
            instance_id,
            plan_id,
            accepts_incomplete,
            parameters,
        } = request;

        self.ensure_idle(&instance_id)?;
        let instance = self.require(&instance_id).await?;
        if instance.status == InstanceStatus::Deleting {
            return Err(BrokerError::Conflict(format!(
                "instance {instance_id} is being deleted"
            )));
        }
        if let Some(plan_id) = &plan_id {
            if plan_id != &instance.plan_id {
                return Err(BrokerError::InvalidParameter(format!(
                    "instance {instance_id} is on plan {}, not {plan_id}",
                    instance.plan_id
                )));
            }
        }

        let queue = instance.queue.clone().ok_or_else(|| {
            BrokerError::NotFound(format!("queue of instance {instance_id}"))
        })?;
        let (completion, ()) = self
            .run(&instance_id, OperationKind::Update, accepts_incomplete, || {
                if let Some(quota_gb) = parameters.queue_quota_gb {
                    let capacity = self.pool.resize(&queue, quota_gb)?;
                    info!(queue = %queue, quota_gb, capacity = %capacity, "Queue resized");
                }

                let change = UpdateChange {
                    instance,
                    queue: queue.clone(),
                    user: parameters.user_name,
                    new_quota_gb: parameters.queue_quota_gb,
                };
                let work = self
                    .work_context()
                    .update(change)
                    .instrument(info_span!("update", instance_id = %instance_id));
                Ok((work, ()))
            })
            .await?;

        Ok(UpdateResponse { completion })
    }

    /// Revokes the instance's queue and removes its record.
    #[instrument(skip(self, request), fields(instance_id = %request.instance_id))]
    pub async fn delete(&self, request: DeleteRequest) -> Result<DeleteResponse, BrokerError> {
        let DeleteRequest {
            instance_id,
            service_id,
            plan_id,
            accepts_incomplete,
        } = request;

        self.ensure_idle(&instance_id)?;
        let instance = self.require(&instance_id).await?;
        if instance.service_id != service_id || instance.plan_id != plan_id {
            return Err(BrokerError::InvalidParameter(format!(
                "instance {instance_id} belongs to {}/{}, not {service_id}/{plan_id}",
                instance.service_id, instance.plan_id
            )));
        }

        let (completion, ()) = self
            .run(&instance_id, OperationKind::Delete, accepts_incomplete, || {
                let work = self
                    .work_context()
                    .deprovision(instance)
                    .instrument(info_span!("delete", instance_id = %instance_id));
                Ok((work, ()))
            })
            .await?;

        Ok(DeleteResponse { completion })
    }

    /// Reports the instance's last asynchronous operation.
    #[instrument(skip(self))]
    pub async fn last_operation(&self, instance_id: &InstanceId) -> OperationOutcome {
        self.registry.poll(instance_id).await
    }

    /// Where the instance currently is in its lifecycle.
    pub async fn lifecycle_state(
        &self,
        instance_id: &InstanceId,
    ) -> Result<LifecycleState, BrokerError> {
        if let Some(kind) = self.registry.pending_kind(instance_id) {
            return Ok(match kind {
                OperationKind::Provision => LifecycleState::Provisioning,
                OperationKind::Update => LifecycleState::Updating,
                OperationKind::Delete => LifecycleState::Deleting,
            });
        }
        Ok(match self.find(instance_id).await? {
            None => LifecycleState::Absent,
            Some(i) if i.status == InstanceStatus::Deleting => LifecycleState::Deleting,
            Some(_) => LifecycleState::Active,
        })
    }

    async fn find(&self, instance_id: &InstanceId) -> Result<Option<ServiceInstance>, BrokerError> {
        self.collaborators
            .repository
            .find_instance(instance_id)
            .await
            .map_err(BrokerError::dependency_fn("look up instance"))
    }

    async fn require(&self, instance_id: &InstanceId) -> Result<ServiceInstance, BrokerError> {
        self.find(instance_id)
            .await?
            .ok_or_else(|| BrokerError::NotFound(format!("instance {instance_id}")))
    }

    fn ensure_idle(&self, instance_id: &InstanceId) -> Result<(), BrokerError> {
        match self.registry.pending_kind(instance_id) {
            Some(kind) => Err(BrokerError::Conflict(format!(
                "instance {instance_id} has a {kind} operation in progress"
            ))),
            None => Ok(()),
        }
    }

    fn credentials(&self, queue: &QueueName) -> Credentials {
        Credentials {
            yarn_queue: format!("{}.{queue}", yarnbroker_capacity::ROOT_QUEUE),
            resource_manager_url: self.settings.resource_manager_url.clone(),
        }
    }

    fn work_context(&self) -> WorkContext {
        WorkContext {
            pool: Arc::clone(&self.pool),
            collaborators: self.collaborators.clone(),
            krb_realm: self.settings.krb_realm.clone(),
            push_lock: Arc::clone(&self.push_lock),
        }
    }

    /// Prepares a work item and runs it in the background (async mode) or
    /// to completion (sync mode).
    ///
    /// Either way `prepare` runs inside the registry's dispatch, so its quota
    /// change only happens if the operation is actually recorded. A sync
    /// request holds its record until it has the work item's result.
    async fn run<T, W>(
        &self,
        instance_id: &InstanceId,
        kind: OperationKind,
        accepts_incomplete: bool,
        prepare: impl FnOnce() -> Result<(W, T), BrokerError>,
    ) -> Result<(Completion, T), BrokerError>
    where
        W: Future<Output = Result<(), BrokerError>> + Send + 'static,
    {
        if accepts_incomplete {
            let output = self.registry.dispatch(instance_id, kind, || {
                let (work, output) = prepare()?;
                Ok((self.runner.submit(work), output))
            })?;
            info!(kind = %kind, "Operation accepted");
            Ok((Completion::Accepted, output))
        } else {
            let (tx, rx) = oneshot::channel();
            let (operation, output) =
                self.registry.dispatch_foreground(instance_id, kind, || {
                    let (work, output) = prepare()?;
                    let work = async move {
                        // Kept by the task if the request is gone, so a
                        // poller can still classify it.
                        match tx.send(work.await) {
                            Ok(()) => Ok(()),
                            Err(result) => result,
                        }
                    };
                    Ok((self.runner.submit(work), output))
                })?;

            let result = match rx.await {
                Ok(result) => {
                    operation.complete();
                    result
                }
                // The work item panicked or was cancelled before reporting.
                Err(e) => match operation.complete() {
                    Some(record) => record.handle.wait().await,
                    None => Err(BrokerError::dependency("work item result lost", e)),
                },
            };
            result?;
            info!(kind = %kind, "Operation completed synchronously");
            Ok((Completion::Completed, output))
        }
    }
}

fn release_queue(pool: &QuotaPool, queue: &QueueName) {
    if let Err(e) = pool.revoke(queue) {
        error!(queue = %queue, error = %e, "Failed to release queue");
    }
}

/// Returns false if the queue could not be put back to `quota_gb`.
fn restore_quota(pool: &QuotaPool, queue: &QueueName, quota_gb: f64) -> bool {
    match pool.resize(queue, quota_gb) {
        Ok(_) => true,
        Err(e) => {
            error!(queue = %queue, quota_gb, error = %e, "Failed to restore queue quota");
            false
        }
    }
}

/// An update, prepared synchronously and applied by the work item.
struct UpdateChange {
    instance: ServiceInstance,
    queue: QueueName,
    user: Option<UserName>,
    new_quota_gb: Option<f64>,
}

/// Everything a work item needs, detached from the orchestrator's lifetime.
#[derive(Clone)]
struct WorkContext {
    pool: Arc<QuotaPool>,
    collaborators: Collaborators,
    krb_realm: String,
    push_lock: Arc<Mutex<()>>,
}

impl WorkContext {
    async fn provision(self, instance: ServiceInstance) -> Result<(), BrokerError> {
        let result = async {
            self.push_config().await?;
            let inserted = self
                .collaborators
                .repository
                .insert(&instance)
                .await
                .map_err(BrokerError::dependency_fn("save instance"))?;
            if inserted {
                Ok(())
            } else {
                Err(BrokerError::Conflict(format!(
                    "instance {} already exists",
                    instance.id
                )))
            }
        }
        .await;

        match &result {
            Ok(()) => info!("Instance provisioned"),
            Err(e) => {
                error!(error = %e, "Provisioning failed, releasing queue");
                if let Some(queue) = &instance.queue {
                    release_queue(&self.pool, queue);
                }
            }
        }
        result
    }

    async fn update(self, change: UpdateChange) -> Result<(), BrokerError> {
        let UpdateChange {
            instance,
            queue,
            user,
            new_quota_gb,
        } = change;

        // The record was read before dispatch; a delete may have landed since.
        let current = match self.reload(&instance.id, &queue).await {
            Ok(current) => current,
            Err(e) => {
                error!(error = %e, "Instance changed before update, rolling back");
                if new_quota_gb.is_some() {
                    restore_quota(&self.pool, &queue, instance.quota_gb);
                }
                return Err(e);
            }
        };

        let mut updated = current.clone();
        let mut added_mapping = None;
        let result = self
            .apply_update(&mut updated, &queue, user, new_quota_gb, &mut added_mapping)
            .await;

        match &result {
            Ok(()) => info!(queue = %queue, users = updated.users.len(), "Instance updated"),
            Err(e) => {
                error!(error = %e, "Update failed, rolling back");
                if let Some(user) = &added_mapping {
                    self.pool.remove_queue_mapping(user, &queue);
                }
                if let Some(new_quota_gb) = new_quota_gb {
                    if !restore_quota(&self.pool, &queue, current.quota_gb) {
                        self.keep_quota(current, new_quota_gb).await;
                    }
                }
            }
        }
        result
    }

    /// The persisted record, if it still owns `queue` and is not being
    /// deleted.
    async fn reload(
        &self,
        instance_id: &InstanceId,
        queue: &QueueName,
    ) -> Result<ServiceInstance, BrokerError> {
        let current = self
            .collaborators
            .repository
            .find_instance(instance_id)
            .await
            .map_err(BrokerError::dependency_fn("look up instance"))?
            .ok_or_else(|| BrokerError::NotFound(format!("instance {instance_id}")))?;
        if current.status == InstanceStatus::Deleting || current.queue.as_ref() != Some(queue) {
            return Err(BrokerError::Conflict(format!(
                "instance {instance_id} is being deleted"
            )));
        }
        Ok(current)
    }

    /// Saves the size a queue kept because its old share was claimed while
    /// the update was failing.
    async fn keep_quota(&self, mut instance: ServiceInstance, quota_gb: f64) {
        instance.quota_gb = quota_gb;
        instance.touch();
        match self.save(&instance).await {
            Ok(()) => warn!(quota_gb, "Queue kept its new size, record updated to match"),
            Err(e) => error!(error = %e, quota_gb, "Failed to record the queue's size"),
        }
    }

    async fn apply_update(
        &self,
        instance: &mut ServiceInstance,
        queue: &QueueName,
        user: Option<UserName>,
        new_quota_gb: Option<f64>,
        added_mapping: &mut Option<UserName>,
    ) -> Result<(), BrokerError> {
        if let Some(user) = user {
            // Tenants read the password from the secret store; nothing else
            // consumes it here.
            self.resolve_credential(&user).await?;

            let mapping = QueueMapping::new(user.clone(), queue.clone());
            let added = self.pool.with_allocator(|allocator| {
                let existed = allocator.config().queue_mappings().contains(&mapping);
                allocator.add_queue_mapping(&user, queue);
                !existed
            });
            if added {
                *added_mapping = Some(user.clone());
            }
            if !instance.users.contains(&user) {
                instance.users.push(user);
            }
        }
        if let Some(quota_gb) = new_quota_gb {
            instance.quota_gb = quota_gb;
        }
        instance.touch();

        self.push_config().await?;
        self.save(instance).await
    }

    async fn deprovision(self, mut instance: ServiceInstance) -> Result<(), BrokerError> {
        // The queue is detached from the record before it is revoked, so a
        // retried delete never releases a queue that was re-granted since.
        let queue = instance.queue.take();
        instance.status = InstanceStatus::Deleting;
        instance.touch();
        self.save(&instance).await?;

        if let Some(queue) = &queue {
            let released = self.pool.with_allocator(|allocator| {
                allocator.remove_queue_mappings(queue);
                allocator.revoke(queue)
            })?;
            debug!(queue = %queue, released, "Queue revoked");
        }

        let result = async {
            self.push_config().await?;
            self.collaborators
                .repository
                .delete(&instance.id)
                .await
                .map_err(BrokerError::dependency_fn("delete instance"))
        }
        .await;

        match &result {
            Ok(()) => info!("Instance deleted"),
            Err(e) => error!(error = %e, "Delete failed, instance left in deleting state"),
        }
        result
    }

    /// Returns the user's Kerberos password.
    ///
    /// A directory user gets the stored secret, or a minted one that is
    /// stored for next time. A user unknown to the directory gets a fresh
    /// password that is never stored.
    async fn resolve_credential(&self, user: &UserName) -> Result<String, BrokerError> {
        let path = password_path(user, &self.krb_realm);
        let known = self
            .collaborators
            .directory
            .user_exists(user)
            .await
            .map_err(BrokerError::dependency_fn("look up directory user"))?;

        if known {
            let stored = self
                .collaborators
                .secrets
                .read_secret(&path)
                .await
                .map_err(BrokerError::dependency_fn("read user secret"))?;
            if let Some(password) = stored {
                debug!(user = %user, "Using stored credential");
                return Ok(password);
            }
        }

        let password = Uuid::new_v4().simple().to_string();
        if known {
            self.collaborators
                .secrets
                .write_secret(&path, &password)
                .await
                .map_err(BrokerError::dependency_fn("write user secret"))?;
        }
        info!(user = %user, known, stored = known, "Minted credential");
        Ok(password)
    }

    /// Pushes the current pool snapshot to the cluster.
    async fn push_config(&self) -> Result<(), BrokerError> {
        let _guard = self.push_lock.lock().await;
        let snapshot = self.pool.snapshot();
        self.collaborators
            .cluster
            .apply_scheduler_config(&snapshot)
            .await
            .map_err(BrokerError::dependency_fn("apply scheduler config"))
    }

    async fn save(&self, instance: &ServiceInstance) -> Result<(), BrokerError> {
        self.collaborators
            .repository
            .save(instance)
            .await
            .map_err(BrokerError::dependency_fn("save instance"))
    }
}

#[cfg(test)]
mod tests {
    use yarnbroker_capacity::CapacitySchedulerConfig;

    use crate::collaborators::{
        Directory, InMemoryDirectory, InMemoryInstanceRepository, InMemorySecretStore, SecretStore,
        StaticCluster,
    };

    use super::*;

    fn context() -> (WorkContext, Arc<InMemoryDirectory>, Arc<InMemorySecretStore>) {
        let total_memory_mb = 1024.0 * 1024.0;
        let cluster = Arc::new(StaticCluster::with_empty_pool(total_memory_mb));
        let allocator = QuotaAllocator::new(
            total_memory_mb,
            CapacitySchedulerConfig::from_properties([
                ("yarn.scheduler.capacity.root.queues", "default"),
                ("yarn.scheduler.capacity.root.default.capacity", "100.00"),
                ("yarn.scheduler.capacity.root.default.maximum-capacity", "100.00"),
            ]),
        )
        .unwrap();

        let directory = Arc::new(InMemoryDirectory::new());
        let secrets = Arc::new(InMemorySecretStore::new());
        let ctx = WorkContext {
            pool: Arc::new(QuotaPool::new(allocator)),
            collaborators: Collaborators {
                repository: Arc::new(InMemoryInstanceRepository::new()),
                directory: directory.clone(),
                secrets: secrets.clone(),
                cluster,
            },
            krb_realm: "EXAMPLE.COM".to_string(),
            push_lock: Arc::new(Mutex::new(())),
        };
        (ctx, directory, secrets)
    }

    #[tokio::test]
    async fn test_known_user_with_stored_secret_keeps_it() {
        let (ctx, directory, secrets) = context();
        let alice = UserName::parse("alice").unwrap();
        directory.add_user(alice.clone()).await;
        let path = password_path(&alice, "EXAMPLE.COM");
        secrets.write_secret(&path, "existing").await.unwrap();

        assert_eq!(ctx.resolve_credential(&alice).await.unwrap(), "existing");
        assert_eq!(secrets.read_secret(&path).await.unwrap().as_deref(), Some("existing"));
    }

    #[tokio::test]
    async fn test_known_user_without_secret_gets_one_stored() {
        let (ctx, directory, secrets) = context();
        let bob = UserName::parse("bob").unwrap();
        directory.add_user(bob.clone()).await;

        let password = ctx.resolve_credential(&bob).await.unwrap();
        let stored = secrets
            .read_secret(&password_path(&bob, "EXAMPLE.COM"))
            .await
            .unwrap();
        assert_eq!(stored, Some(password));
    }

    #[tokio::test]
    async fn test_unknown_user_gets_fresh_unstored_password() {
        let (ctx, directory, secrets) = context();
        let carol = UserName::parse("carol").unwrap();
        assert!(!directory.user_exists(&carol).await.unwrap());

        let first = ctx.resolve_credential(&carol).await.unwrap();
        let second = ctx.resolve_credential(&carol).await.unwrap();
        assert_eq!(first.len(), 32);
        assert_ne!(first, second);
        let stored = secrets
            .read_secret(&password_path(&carol, "EXAMPLE.COM"))
            .await
            .unwrap();
        assert_eq!(stored, None);
    }

    #[tokio::test]
    async fn test_directory_outage_is_dependency_error() {
        let (ctx, directory, _secrets) = context();
        directory.set_unavailable(true);
        let err = ctx
            .resolve_credential(&UserName::parse("dave").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "dependency_failure");
    }

    #[tokio::test]
    async fn test_reload_rejects_changed_records() {
        let (ctx, _directory, _secrets) = context();
        let queue = QueueName::parse("q1").unwrap();
        let mut instance = ServiceInstance::new(
            InstanceId::parse("inst-1").unwrap(),
            ServiceId::parse("yarn").unwrap(),
            PlanId::parse("yarn-shared").unwrap(),
            queue.clone(),
            102.4,
        );

        let err = ctx.reload(&instance.id, &queue).await.unwrap_err();
        assert!(matches!(err, BrokerError::NotFound(_)));

        ctx.save(&instance).await.unwrap();
        assert_eq!(ctx.reload(&instance.id, &queue).await.unwrap(), instance);
        let other = QueueName::parse("q2").unwrap();
        assert!(matches!(
            ctx.reload(&instance.id, &other).await,
            Err(BrokerError::Conflict(_))
        ));

        instance.status = InstanceStatus::Deleting;
        ctx.save(&instance).await.unwrap();
        assert!(matches!(
            ctx.reload(&instance.id, &queue).await,
            Err(BrokerError::Conflict(_))
        ));
    }
}
