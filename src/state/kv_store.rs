//! Key-value persistence for login state
//!
//! The gateway only needs `get`/`set`/`remove` on JSON values. `JsonFileStore` keeps
//! everything in one JSON document on disk; `MemoryStore` is for tests and
//! throwaway deployments.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{GatewayError, Result};

/// Minimal async key-value interface
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

pub type SharedKvStore = Arc<dyn KvStore>;

/// In-memory store backed by a concurrent map
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// On-disk document layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    /// Schema version for migrations
    version: u32,

    /// Last update timestamp
    last_updated: i64,

    entries: HashMap<String, Value>,
}

/// Store persisted to a single JSON file, rewritten atomically on every set
pub struct JsonFileStore {
    path: String,
    document: RwLock<StoreDocument>,
}

impl JsonFileStore {
    /// Load from a JSON file, or start empty if it does not exist yet
    pub async fn open(path: &str) -> Result<Self> {
        let document = match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| GatewayError::StoreParse {
                    path: path.to_string(),
                    source: e,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No store at {}, starting empty", path);
                StoreDocument {
                    version: 1,
                    ..Default::default()
                }
            }
            Err(e) => {
                return Err(GatewayError::StoreLoad {
                    path: path.to_string(),
                    source: e,
                })
            }
        };

        Ok(Self {
            path: path.to_string(),
            document: RwLock::new(document),
        })
    }

    pub async fn len(&self) -> usize {
        self.document.read().await.entries.len()
    }

    async fn save(&self, document: &StoreDocument) -> Result<()> {
        let content = serde_json::to_string_pretty(document)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = format!("{}.tmp", self.path);
        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(|e| GatewayError::StoreSave {
                path: self.path.clone(),
                source: e,
            })?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| GatewayError::StoreSave {
                path: self.path.clone(),
                source: e,
            })
    }
}

#[async_trait]
impl KvStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.document.read().await.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        // Hold the write lock across the save so concurrent sets hit disk in order
        let mut document = self.document.write().await;
        let previous = document.entries.insert(key.to_string(), value);
        let previous_updated = document.last_updated;
        document.last_updated = chrono::Utc::now().timestamp();

        if let Err(e) = self.save(&document).await {
            // Keep memory consistent with what is on disk
            match previous {
                Some(old) => {
                    document.entries.insert(key.to_string(), old);
                }
                None => {
                    document.entries.remove(key);
                }
            }
            document.last_updated = previous_updated;
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut document = self.document.write().await;
        let Some(previous) = document.entries.remove(key) else {
            return Ok(());
        };
        let previous_updated = document.last_updated;
        document.last_updated = chrono::Utc::now().timestamp();

        if let Err(e) = self.save(&document).await {
            document.entries.insert(key.to_string(), previous);
            document.last_updated = previous_updated;
            return Err(e);
        }
        Ok(())
    }
}
