//! Asynchronous operation tracking: a task runner that executes work items
//! in the background and a registry that tracks one in-flight operation per
//! instance.

mod registry;
mod runner;

pub use registry::{
    ForegroundOperation, OperationKind, OperationOutcome, OperationRecord, OperationRegistry,
};
pub use runner::{TaskHandle, TaskRunner, TaskRunnerConfig, DEFAULT_MAX_CONCURRENT_TASKS};
