//! Feed error types.

use std::sync::Arc;

use crate::codec::CodecError;
use crate::encoding::EncodingError;
use crate::storage::StoreError;

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;

/// Errors surfaced by feed operations.
///
/// Cloneable so one failure can be delivered to every caller that shared it
/// (all appends in a failed batch, all callers waiting on baseline discovery).
#[derive(Debug, Clone, thiserror::Error)]
pub enum FeedError {
    #[error("Store error: {0}")]
    Store(Arc<StoreError>),

    #[error("Feed initialization failed: {0}")]
    Init(Arc<StoreError>),

    #[error("Batch commit failed: {0}")]
    BatchCommit(Arc<StoreError>),

    #[error("Invalid change key: {0}")]
    Codec(#[from] CodecError),

    #[error("Value encoding error: {0}")]
    Encoding(Arc<EncodingError>),

    #[error("Change numbers exhausted after {last}")]
    Exhausted { last: u64 },

    #[error("Feed dropped before the operation completed")]
    Cancelled,
}

impl FeedError {
    /// True when the underlying store reported a missing key.
    pub fn is_not_found(&self) -> bool {
        match self {
            FeedError::Store(e) => e.is_not_found(),
            _ => false,
        }
    }
}

impl From<StoreError> for FeedError {
    fn from(e: StoreError) -> Self {
        FeedError::Store(Arc::new(e))
    }
}

impl From<EncodingError> for FeedError {
    fn from(e: EncodingError) -> Self {
        FeedError::Encoding(Arc::new(e))
    }
}
