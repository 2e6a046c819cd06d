//! Change feed over an ordered store.
//!
//! A [`Feed`] assigns every appended value the next change number, writes
//! concurrent appends as one atomic batch per scheduling tick, and serves
//! historical and live reads.
//!
//! ## Architecture
//! ```text
//! append ──> gate (baseline known?) ──> queue (assign + batch) ──> Store::batch
//!                                                                     │
//!                           live readers <── waiters.release ─────────┘
//! ```
//!
//! All mutable feed state sits behind one mutex that is never held across an
//! await, so every transition is atomic with respect to the others.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::codec;
use crate::encoding::{Value, ValueEncoding};
use crate::storage::Store;

mod error;
mod gate;
mod queue;
mod stream;
mod waiters;

pub use error::{FeedError, Result};
pub use queue::Append;
pub use stream::{FeedStream, ReadItem, ReadOptions};

use gate::GateState;
use queue::{ParkedAppend, PendingItem};
use waiters::WaiterRegistry;

/// A committed feed entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub change: u64,
    pub value: Value,
}

/// Feed construction options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOptions {
    /// First change number handed out on an empty store.
    pub start: u64,
}

impl FeedOptions {
    pub const DEFAULT_START: u64 = 1;
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            start: Self::DEFAULT_START,
        }
    }
}

/// Options for [`Feed::get_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Return the stored bytes without decoding them.
    pub raw: bool,
}

/// Mutable feed state.
///
/// Counters are kept as "next" values so the empty baseline `start - 1` never
/// has to be represented: `change == next_change - 1`.
pub(crate) struct FeedState {
    /// Next number to assign.
    next_change: u64,
    /// Next number after every append accepted so far, assigned or not.
    tentative_next: u64,
    /// First number not yet settled by a completed batch (or the baseline).
    durable_next: u64,
    /// Appends accepted but not yet through a batch commit.
    queued: u64,
    gate: GateState,
    /// Appends accepted before the baseline was known, in call order.
    parked: Vec<ParkedAppend>,
    pending_batch: Vec<PendingItem>,
    flush_scheduled: bool,
    waiters: WaiterRegistry,
}

impl FeedState {
    fn new(start: u64) -> Self {
        Self {
            next_change: start,
            tentative_next: start,
            durable_next: start,
            queued: 0,
            gate: GateState::Unresolved,
            parked: Vec::new(),
            pending_batch: Vec::new(),
            flush_scheduled: false,
            waiters: WaiterRegistry::default(),
        }
    }
}

pub(crate) struct Inner {
    store: Arc<dyn Store>,
    encoding: ValueEncoding,
    start: u64,
    state: Mutex<FeedState>,
    /// Serializes batch writes so they land in detach order.
    write_lock: AsyncMutex<()>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, FeedState> {
        // State transitions never panic midway; a poisoned lock still holds consistent state.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Append-only change feed.
///
/// Cheap to clone; clones share state. Must be used from within a tokio
/// runtime, since appends and baseline discovery run as spawned tasks.
#[derive(Clone)]
pub struct Feed {
    inner: Arc<Inner>,
}

impl Feed {
    /// Create a feed over `store`.
    ///
    /// Nothing is read until the first operation that needs the baseline.
    pub fn new(store: Arc<dyn Store>, options: FeedOptions) -> Self {
        let encoding = store.value_encoding();
        debug!(start = options.start, encoding = %encoding, "Feed created");
        Self {
            inner: Arc::new(Inner {
                store,
                encoding,
                start: options.start,
                state: Mutex::new(FeedState::new(options.start)),
                write_lock: AsyncMutex::new(()),
            }),
        }
    }

    /// Configured first change number.
    pub fn start(&self) -> u64 {
        self.inner.start
    }

    /// Last assigned change number, `None` when nothing precedes `start`.
    pub fn change(&self) -> Option<u64> {
        self.inner.lock().next_change.checked_sub(1)
    }

    /// Last change number handed out, including appends not yet assigned or durable.
    pub fn tentative_change(&self) -> Option<u64> {
        self.inner.lock().tentative_next.checked_sub(1)
    }

    /// Appends accepted but not yet committed.
    pub fn queued(&self) -> u64 {
        self.inner.lock().queued
    }

    /// True once the baseline has been discovered.
    pub fn is_ready(&self) -> bool {
        matches!(self.inner.lock().gate, GateState::Resolved)
    }

    /// Number of live readers currently parked.
    pub fn waiting_readers(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Encoding applied to stored values.
    pub fn value_encoding(&self) -> ValueEncoding {
        self.inner.encoding
    }

    /// Discover the baseline from the store if not already known.
    pub async fn ensure_ready(&self) -> Result<()> {
        self.inner.ensure_ready().await
    }

    /// Number of entries the feed has assigned from `start` onwards.
    pub async fn count(&self) -> Result<u64> {
        self.inner.ensure_ready().await?;
        let state = self.inner.lock();
        Ok(state.next_change.saturating_sub(self.inner.start))
    }

    /// Append a value.
    ///
    /// Counters move before this returns. The returned future resolves once
    /// the batch holding this append is written; dropping it does not cancel
    /// the append.
    pub fn append(&self, value: impl Into<Value>) -> Append {
        self.inner.append(value.into())
    }

    /// Read entries; see [`ReadOptions`].
    pub fn read_stream(&self, options: ReadOptions) -> FeedStream {
        if options.live {
            stream::live(Arc::clone(&self.inner), options)
        } else {
            stream::historical(Arc::clone(&self.inner), options)
        }
    }

    /// Read one entry's value.
    pub async fn get(&self, id: u64) -> Result<Value> {
        self.get_with(id, GetOptions::default()).await
    }

    /// Read one entry's value with options.
    pub async fn get_with(&self, id: u64, options: GetOptions) -> Result<Value> {
        let raw = self.inner.store.get(&codec::encode(id)).await?;
        if options.raw {
            return Ok(Value::from(raw));
        }
        Ok(self.inner.encoding.decode(raw)?)
    }

    /// Delete one entry. Its number is never reused.
    pub async fn del(&self, id: u64) -> Result<()> {
        self.inner.store.del(&codec::encode(id)).await?;
        Ok(())
    }
}
