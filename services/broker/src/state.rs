//! Application state shared across request handlers.

use std::sync::Arc;

use crate::lifecycle::LifecycleOrchestrator;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    orchestrator: LifecycleOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: LifecycleOrchestrator) -> Self {
        Self {
            inner: Arc::new(AppStateInner { orchestrator }),
        }
    }

    pub fn orchestrator(&self) -> &LifecycleOrchestrator {
        &self.inner.orchestrator
    }
}
