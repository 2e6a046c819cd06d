//! In-memory ordered store.
//!
//! BTreeMap-backed [`Store`] used for tests and embedded feeds. Carries
//! failure injection knobs and call counters so feed behavior can be checked
//! against store traffic.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::{watch, RwLock};
use tracing::debug;

use crate::encoding::ValueEncoding;
use crate::storage::{BatchOp, IterOptions, Record, RecordStream, Result, Store, StoreError};

/// In-memory store holding keys in byte order.
pub struct MemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    value_encoding: ValueEncoding,
    closing: watch::Sender<bool>,
    fail_on_get: RwLock<bool>,
    fail_on_batch: RwLock<bool>,
    fail_on_iter: RwLock<bool>,
    iter_calls: AtomicUsize,
    /// Keys of every batch applied (or attempted), in order.
    batches: RwLock<Vec<Vec<Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new(value_encoding: ValueEncoding) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            data: RwLock::new(BTreeMap::new()),
            value_encoding,
            closing,
            fail_on_get: RwLock::new(false),
            fail_on_batch: RwLock::new(false),
            fail_on_iter: RwLock::new(false),
            iter_calls: AtomicUsize::new(0),
            batches: RwLock::new(Vec::new()),
        }
    }

    /// Binary-encoded store.
    pub fn binary() -> Self {
        Self::new(ValueEncoding::Binary)
    }

    /// JSON-encoded store.
    pub fn json() -> Self {
        Self::new(ValueEncoding::Json)
    }

    pub async fn set_fail_on_get(&self, fail: bool) {
        *self.fail_on_get.write().await = fail;
    }

    pub async fn set_fail_on_batch(&self, fail: bool) {
        *self.fail_on_batch.write().await = fail;
    }

    pub async fn set_fail_on_iter(&self, fail: bool) {
        *self.fail_on_iter.write().await = fail;
    }

    /// Number of range iterations opened so far.
    pub fn iter_calls(&self) -> usize {
        self.iter_calls.load(Ordering::SeqCst)
    }

    /// Sizes of every batch applied (or attempted), in order.
    pub async fn batch_sizes(&self) -> Vec<usize> {
        self.batches.read().await.iter().map(Vec::len).collect()
    }

    /// Keys of every batch applied (or attempted), in order.
    pub async fn batch_keys(&self) -> Vec<Vec<Vec<u8>>> {
        self.batches.read().await.clone()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    fn check_open(&self) -> Result<()> {
        if *self.closing.borrow() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::binary()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.check_open()?;
        if *self.fail_on_get.read().await {
            return Err(StoreError::Injected("get".to_string()));
        }
        self.data
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(key))
    }

    async fn del(&self, key: &[u8]) -> Result<()> {
        self.check_open()?;
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        self.check_open()?;
        let keys = ops
            .iter()
            .map(|op| match op {
                BatchOp::Put { key, .. } | BatchOp::Del { key } => key.clone(),
            })
            .collect();
        self.batches.write().await.push(keys);
        if *self.fail_on_batch.read().await {
            return Err(StoreError::Injected("batch".to_string()));
        }

        let mut data = self.data.write().await;
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Del { key } => {
                    data.remove(&key);
                }
            }
        }
        debug!(keys = data.len(), "Memory batch applied");
        Ok(())
    }

    async fn iter(&self, options: IterOptions) -> Result<RecordStream> {
        self.check_open()?;
        self.iter_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_on_iter.read().await {
            return Err(StoreError::Injected("iter".to_string()));
        }

        let data = self.data.read().await;
        let lower = match &options.gt {
            Some(gt) => Bound::Excluded(gt.clone()),
            None => Bound::Unbounded,
        };
        let range = data.range((lower, Bound::Unbounded));
        let limit = options.limit.unwrap_or(usize::MAX);
        let to_record = |(k, v): (&Vec<u8>, &Vec<u8>)| {
            Ok(Record {
                key: options.keys.then(|| k.clone()),
                value: options.values.then(|| v.clone()),
            })
        };

        // Snapshot under the read lock; later writes do not affect this iteration.
        let records: Vec<Result<Record>> = if options.reverse {
            range.rev().take(limit).map(to_record).collect()
        } else {
            range.take(limit).map(to_record).collect()
        };

        Ok(Box::pin(stream::iter(records)))
    }

    fn value_encoding(&self) -> ValueEncoding {
        self.value_encoding
    }

    fn closing(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }

    async fn close(&self) -> Result<()> {
        self.closing.send_replace(true);
        Ok(())
    }
}
