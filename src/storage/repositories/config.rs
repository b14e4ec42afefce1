//! Backend configuration repository
//!
//! The current config lives under one key; every accepted write is also
//! copied to `config_history/<version>`.

use crate::domain::BrokerConfig;
use crate::errors::Result;
use crate::storage::{Storage, StorageEntry};
use std::sync::Arc;
use tracing::instrument;

const CONFIG_KEY: &str = "config";
const HISTORY_PREFIX: &str = "config_history/";

#[derive(Debug, Clone)]
pub struct ConfigRepository {
    storage: Arc<dyn Storage>,
}

impl ConfigRepository {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    #[instrument(skip(self), name = "storage_get_config")]
    pub async fn get(&self) -> Result<Option<BrokerConfig>> {
        match self.storage.get(CONFIG_KEY).await? {
            Some(entry) => Ok(Some(entry.decode()?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, config), fields(version = config.version), name = "storage_put_config")]
    pub async fn put(&self, config: &BrokerConfig) -> Result<()> {
        self.storage.put(StorageEntry::json(CONFIG_KEY, config)?).await
    }

    /// Record `config` under its version in the history.
    #[instrument(skip(self, config), fields(version = config.version), name = "storage_put_config_history")]
    pub async fn put_history(&self, config: &BrokerConfig) -> Result<()> {
        let key = format!("{}{}", HISTORY_PREFIX, config.version);
        self.storage.put(StorageEntry::json(key, config)?).await
    }

    pub async fn get_version(&self, version: u64) -> Result<Option<BrokerConfig>> {
        let key = format!("{}{}", HISTORY_PREFIX, version);
        match self.storage.get(&key).await? {
            Some(entry) => Ok(Some(entry.decode()?)),
            None => Ok(None),
        }
    }

    /// Versions with a history entry, ascending.
    pub async fn history_versions(&self) -> Result<Vec<u64>> {
        let mut versions: Vec<u64> = self
            .storage
            .list(HISTORY_PREFIX)
            .await?
            .iter()
            .filter_map(|suffix| suffix.parse().ok())
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    #[instrument(skip(self), name = "storage_delete_config")]
    pub async fn delete(&self) -> Result<()> {
        self.storage.delete(CONFIG_KEY).await
    }
}
