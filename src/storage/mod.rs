//! Ordered key-value storage.
//!
//! This module contains:
//! - `Store` trait: the ordered store a feed is layered on
//! - Batch, iteration and record types shared by all backends
//! - Implementations: in-memory, SQLite
//!
//! Keys are opaque bytes compared lexicographically. Values are opaque bytes;
//! each store carries the [`ValueEncoding`] its values were written with.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::watch;
use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::encoding::ValueEncoding;

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Key not found: {key}")]
    NotFound { key: String },

    #[error("Store is closed")]
    Closed,

    #[error("Injected failure: {0}")]
    Injected(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Build a not-found error for a raw key.
    pub fn not_found(key: &[u8]) -> Self {
        StoreError::NotFound {
            key: String::from_utf8_lossy(key).into_owned(),
        }
    }

    /// True when the error only means "no value at this key".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// One operation in an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Del { key: Vec<u8> },
}

/// Range iteration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterOptions {
    /// Exclusive lower bound. `None` starts at the first key.
    pub gt: Option<Vec<u8>>,
    /// Iterate from the highest key down.
    pub reverse: bool,
    /// Maximum number of records.
    pub limit: Option<usize>,
    /// Include keys in records.
    pub keys: bool,
    /// Include values in records.
    pub values: bool,
}

impl Default for IterOptions {
    fn default() -> Self {
        Self {
            gt: None,
            reverse: false,
            limit: None,
            keys: true,
            values: true,
        }
    }
}

/// A record produced by range iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

/// Ordered stream of records.
pub type RecordStream = BoxStream<'static, Result<Record>>;

/// Interface for ordered key-value storage.
///
/// Implementations:
/// - `MemoryStore`: BTreeMap-backed, for tests and embedded use
/// - `SqliteStore`: SQLite storage
#[async_trait]
pub trait Store: Send + Sync {
    /// Read one value. Missing keys yield [`StoreError::NotFound`].
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Delete one key. Deleting a missing key is not an error.
    async fn del(&self, key: &[u8]) -> Result<()>;

    /// Apply all operations atomically, all-or-nothing.
    async fn batch(&self, ops: Vec<BatchOp>) -> Result<()>;

    /// Iterate keys in order per `options`.
    async fn iter(&self, options: IterOptions) -> Result<RecordStream>;

    /// Encoding applied to every stored value.
    fn value_encoding(&self) -> ValueEncoding;

    /// Shutdown signal. Flips to `true` once the store begins closing.
    ///
    /// Dropping the receiver unsubscribes.
    fn closing(&self) -> watch::Receiver<bool>;

    /// Begin closing. Later operations fail with [`StoreError::Closed`].
    async fn close(&self) -> Result<()>;
}

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn Store>> {
    info!(
        storage_type = ?config.storage_type,
        path = %config.path,
        value_encoding = %config.value_encoding,
        "Initializing storage"
    );

    match config.storage_type {
        StorageType::Memory => Ok(Arc::new(MemoryStore::new(config.value_encoding))),
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            if let Some(parent) = std::path::Path::new(&config.path).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Schema(format!("create {:?}: {}", parent, e)))?;
            }

            let pool =
                sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.path)).await?;
            let store = SqliteStore::new(pool, config.value_encoding);
            store.init().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err(StoreError::Schema("sqlite feature not enabled".to_string()))
        }
    }
}
