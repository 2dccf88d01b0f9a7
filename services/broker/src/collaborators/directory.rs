//! Directory lookup and secret storage.
//!
//! Tenants are bound to queues by their directory user name. Each user has a
//! Kerberos password kept in the secret store under
//! `/servicebroker/user/krbinfo/<user>@<realm>/password`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use yarnbroker_id::UserName;

/// Directory-service (LDAP-style) user lookup.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn user_exists(&self, name: &UserName) -> Result<bool>;
}

/// Key-value secret storage.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn read_secret(&self, path: &str) -> Result<Option<String>>;
    async fn write_secret(&self, path: &str, value: &str) -> Result<()>;
}

/// Secret path of a user's Kerberos password.
pub fn password_path(user: &UserName, realm: &str) -> String {
    format!("/servicebroker/user/krbinfo/{user}@{realm}/password")
}

/// In-process directory for development and tests.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashSet<UserName>>,
    unavailable: AtomicBool,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, name: UserName) {
        self.users.write().await.insert(name);
    }

    /// Make lookups fail, as if the directory server were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn user_exists(&self, name: &UserName) -> Result<bool> {
        if self.unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("directory unavailable");
        }
        Ok(self.users.read().await.contains(name))
    }
}

/// In-process secret store for development and tests.
#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, String>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn read_secret(&self, path: &str) -> Result<Option<String>> {
        Ok(self.secrets.read().await.get(path).cloned())
    }

    async fn write_secret(&self, path: &str, value: &str) -> Result<()> {
        self.secrets
            .write()
            .await
            .insert(path.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_path() {
        let user = UserName::parse("alice").unwrap();
        assert_eq!(
            password_path(&user, "EXAMPLE.COM"),
            "/servicebroker/user/krbinfo/alice@EXAMPLE.COM/password"
        );
    }

    #[tokio::test]
    async fn test_directory_lookup() {
        let dir = InMemoryDirectory::new();
        let alice = UserName::parse("alice").unwrap();
        assert!(!dir.user_exists(&alice).await.unwrap());
        dir.add_user(alice.clone()).await;
        assert!(dir.user_exists(&alice).await.unwrap());

        dir.set_unavailable(true);
        assert!(dir.user_exists(&alice).await.is_err());
    }

    #[tokio::test]
    async fn test_secret_store() {
        let store = InMemorySecretStore::new();
        assert_eq!(store.read_secret("/a").await.unwrap(), None);
        store.write_secret("/a", "s3cret").await.unwrap();
        assert_eq!(store.read_secret("/a").await.unwrap().as_deref(), Some("s3cret"));
    }
}
