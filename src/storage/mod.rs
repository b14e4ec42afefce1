//! # Storage and Persistence
//!
//! The broker persists two things: the backend configuration (with version
//! history) and roles. Both go through the [`Storage`] key-value seam so the
//! embedding host can supply its own backend; [`InMemoryStorage`] is the
//! default.

pub mod memory;
pub mod repositories;

use crate::errors::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

pub use memory::InMemoryStorage;
pub use repositories::{ConfigRepository, RoleRepository};

/// A stored value. Values are JSON documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl StorageEntry {
    pub fn json<T: Serialize>(key: impl Into<String>, value: &T) -> Result<Self> {
        let key = key.into();
        let value = serde_json::to_vec(value).map_err(|source| Error::Serialization {
            source,
            context: format!("Failed to encode storage entry '{}'", key),
        })?;
        Ok(Self { key, value })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.value).map_err(|source| Error::Serialization {
            source,
            context: format!("Failed to decode storage entry '{}'", self.key),
        })
    }
}

/// Key-value persistence supplied by the host.
#[async_trait]
pub trait Storage: Send + Sync + fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>>;

    async fn put(&self, entry: StorageEntry) -> Result<()>;

    /// Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Keys under `prefix`, with the prefix stripped, in sorted order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
