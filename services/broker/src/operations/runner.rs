//! Background execution of provisioning work.
//!
//! Work items run on their own tokio tasks, decoupled from request handling.
//! A semaphore bounds how many run at once; queued items simply count as not
//! done yet.

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tracing::error;

use crate::error::BrokerError;

/// Default upper bound on concurrently running work items.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 8;

/// Task runner configuration.
#[derive(Debug, Clone)]
pub struct TaskRunnerConfig {
    /// Maximum work items executing at once.
    pub max_concurrent: usize,
}

impl Default for TaskRunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

/// Schedules work items on the tokio runtime.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    permits: Arc<Semaphore>,
}

impl TaskRunner {
    pub fn new(config: TaskRunnerConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        }
    }

    /// Starts `work` in the background and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<T, F>(&self, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, BrokerError>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let join = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| BrokerError::dependency("task runner closed", e))?;
            work.await
        });
        TaskHandle { join }
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new(TaskRunnerConfig::default())
    }
}

/// Reference to a submitted work item and its eventual result.
///
/// Dropping the handle detaches the work item; it still runs to completion.
#[derive(Debug)]
pub struct TaskHandle<T> {
    join: JoinHandle<Result<T, BrokerError>>,
}

impl<T> TaskHandle<T> {
    /// True once the work item has returned, failed, or panicked.
    pub fn is_done(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the work item. Only the synchronous request path uses this.
    pub async fn wait(self) -> Result<T, BrokerError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(join_failure(e)),
        }
    }

    /// The result of a finished work item, without waiting.
    ///
    /// Returns `None` if the work item is still running.
    pub fn into_outcome(self) -> Option<Result<T, BrokerError>> {
        if !self.is_done() {
            return None;
        }
        self.join.now_or_never().map(|joined| match joined {
            Ok(result) => result,
            Err(e) => Err(join_failure(e)),
        })
    }
}

fn join_failure(e: JoinError) -> BrokerError {
    error!(error = %e, "Work item did not complete");
    let reason = if e.is_panic() {
        "work item panicked"
    } else {
        "work item was cancelled"
    };
    BrokerError::dependency(reason, e)
}
