//! Role repository, one entry per role under `role/<name>`.

use crate::domain::Role;
use crate::errors::Result;
use crate::storage::{Storage, StorageEntry};
use std::sync::Arc;
use tracing::instrument;

const ROLE_PREFIX: &str = "role/";

fn role_key(name: &str) -> String {
    format!("{}{}", ROLE_PREFIX, name)
}

#[derive(Debug, Clone)]
pub struct RoleRepository {
    storage: Arc<dyn Storage>,
}

impl RoleRepository {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    #[instrument(skip(self), fields(role = %name), name = "storage_get_role")]
    pub async fn get(&self, name: &str) -> Result<Option<Role>> {
        match self.storage.get(&role_key(name)).await? {
            Some(entry) => Ok(Some(entry.decode()?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, role), fields(role = %role.name), name = "storage_put_role")]
    pub async fn put(&self, role: &Role) -> Result<()> {
        self.storage.put(StorageEntry::json(role_key(&role.name), role)?).await
    }

    #[instrument(skip(self), fields(role = %name), name = "storage_delete_role")]
    pub async fn delete(&self, name: &str) -> Result<()> {
        self.storage.delete(&role_key(name)).await
    }

    /// Role names in sorted order.
    pub async fn list(&self) -> Result<Vec<String>> {
        self.storage.list(ROLE_PREFIX).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    #[tokio::test]
    async fn crud_and_list() {
        let repo = RoleRepository::new(Arc::new(InMemoryStorage::new()));

        let mut reader = Role::new("reader");
        reader.role_ids = vec!["r-1".to_string()];
        repo.put(&reader).await.unwrap();
        repo.put(&Role::new("admin")).await.unwrap();

        assert_eq!(repo.get("reader").await.unwrap(), Some(reader));
        assert!(repo.get("missing").await.unwrap().is_none());
        assert_eq!(repo.list().await.unwrap(), vec!["admin", "reader"]);

        repo.delete("admin").await.unwrap();
        assert_eq!(repo.list().await.unwrap(), vec!["reader"]);
    }
}
