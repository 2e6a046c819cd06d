//! Storage configuration types.

use serde::Deserialize;

use crate::encoding::ValueEncoding;

/// Storage type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Memory,
    Sqlite,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// Database path (sqlite only).
    pub path: String,
    /// Encoding applied to stored values.
    pub value_encoding: ValueEncoding,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            path: "data/changefeed.db".to_string(),
            value_encoding: ValueEncoding::Binary,
        }
    }
}
