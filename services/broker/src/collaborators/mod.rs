//! External collaborators the lifecycle orchestrator depends on.
//!
//! Each collaborator is a trait so production backends (a key-value store, an
//! LDAP server, the cluster-admin REST API) can be injected at construction
//! time. In-memory implementations ship for development and tests.

mod cluster;
mod directory;
mod persistence;

use std::sync::Arc;

pub use cluster::{ClusterAdmin, StaticCluster};
pub use directory::{password_path, Directory, InMemoryDirectory, InMemorySecretStore, SecretStore};
pub use persistence::{InMemoryInstanceRepository, InstanceRepository};

/// The full set of collaborators, injected into the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub repository: Arc<dyn InstanceRepository>,
    pub directory: Arc<dyn Directory>,
    pub secrets: Arc<dyn SecretStore>,
    pub cluster: Arc<dyn ClusterAdmin>,
}

impl Collaborators {
    /// In-memory backends around the given cluster.
    pub fn in_memory(cluster: Arc<dyn ClusterAdmin>) -> Self {
        Self {
            repository: Arc::new(InMemoryInstanceRepository::new()),
            directory: Arc::new(InMemoryDirectory::new()),
            secrets: Arc::new(InMemorySecretStore::new()),
            cluster,
        }
    }
}
