//! Historical and live read streams.

use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::{future, StreamExt};
use tokio::sync::watch;
use tracing::debug;

use super::gate::GateState;
use super::{Entry, FeedError, Inner, Result};
use crate::codec;
use crate::encoding::{Value, ValueEncoding};
use crate::storage::{IterOptions, Record, StoreError};

/// Stream of read results. Ends after the first error.
pub type FeedStream = BoxStream<'static, Result<ReadItem>>;

/// One item from a read stream, shaped by [`ReadOptions::keys`] and
/// [`ReadOptions::values`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReadItem {
    /// `keys` and `values` both set.
    Entry(Entry),
    /// `keys` unset: the bare value.
    Value(Value),
    /// `values` unset: the bare change number.
    Change(u64),
}

impl ReadItem {
    pub fn into_entry(self) -> Option<Entry> {
        match self {
            ReadItem::Entry(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn change(&self) -> Option<u64> {
        match self {
            ReadItem::Entry(entry) => Some(entry.change),
            ReadItem::Change(change) => Some(*change),
            ReadItem::Value(_) => None,
        }
    }
}

/// Read stream options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// Exclusive lower bound. `None` reads from `start`.
    pub since: Option<u64>,
    /// Keep waiting for new entries instead of ending.
    pub live: bool,
    /// Stop after this many items.
    pub limit: Option<usize>,
    /// Highest change first (historical reads only).
    pub reverse: bool,
    /// Include change numbers.
    pub keys: bool,
    /// Include values.
    pub values: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            since: None,
            live: false,
            limit: None,
            reverse: false,
            keys: true,
            values: true,
        }
    }
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.values = false;
        self
    }

    pub fn values_only(mut self) -> Self {
        self.keys = false;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Shape {
    keys: bool,
    values: bool,
}

impl Shape {
    fn of(options: &ReadOptions) -> Self {
        Self {
            keys: options.keys,
            values: options.values,
        }
    }

    /// Whether the value has to be read at all.
    fn wants_value(self) -> bool {
        self.values || !self.keys
    }

    fn format(self, change: u64, value: Option<Value>) -> ReadItem {
        match (self.keys, self.values, value) {
            (true, true, Some(value)) => ReadItem::Entry(Entry { change, value }),
            (false, _, Some(value)) => ReadItem::Value(value),
            _ => ReadItem::Change(change),
        }
    }
}

/// Bounded range read over the store.
pub(crate) fn historical(inner: Arc<Inner>, options: ReadOptions) -> FeedStream {
    let shape = Shape::of(&options);
    let encoding = inner.encoding;
    let gt = match options.since {
        Some(since) => Some(codec::encode(since)),
        None => inner.start.checked_sub(1).map(codec::encode),
    };
    let iter_options = IterOptions {
        gt,
        reverse: options.reverse,
        limit: options.limit,
        keys: shape.keys,
        values: shape.wants_value(),
    };

    let records = stream::once(async move { inner.store.iter(iter_options).await })
        .map(|opened| match opened {
            Ok(records) => records.boxed(),
            Err(e) => stream::once(future::ready(Err(e))).boxed(),
        })
        .flatten()
        .map(move |record| {
            record
                .map_err(FeedError::from)
                .and_then(|record| format_record(record, shape, encoding))
        });

    end_after_error(records)
}

fn format_record(record: Record, shape: Shape, encoding: ValueEncoding) -> Result<ReadItem> {
    let change = match &record.key {
        Some(key) => codec::decode(key)?,
        None => 0,
    };
    let value = match record.value {
        Some(raw) if shape.wants_value() => Some(encoding.decode(raw)?),
        _ => None,
    };
    Ok(shape.format(change, value))
}

/// Yield items up to and including the first error, then end.
fn end_after_error(
    items: impl futures::Stream<Item = Result<ReadItem>> + Send + 'static,
) -> FeedStream {
    items
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        })
        .boxed()
}

/// Polling cursor behind a live stream.
struct LiveCursor {
    inner: Arc<Inner>,
    next: u64,
    remaining: Option<usize>,
    shape: Shape,
    /// Store shutdown subscription, dropped with the stream.
    closing: watch::Receiver<bool>,
    done: bool,
}

enum Miss {
    Skip,
    Retry,
    Park(tokio::sync::oneshot::Receiver<()>),
}

impl LiveCursor {
    async fn next_item(&mut self) -> Option<Result<ReadItem>> {
        if self.done || self.remaining == Some(0) {
            return None;
        }

        loop {
            if *self.closing.borrow() {
                return None;
            }

            let epoch = self.inner.lock().waiters.epoch();
            let key = codec::encode(self.next);
            let fetched = self.inner.store.get(&key).await;
            match fetched {
                Ok(raw) => return Some(self.emit(raw)),
                Err(e) if e.is_not_found() => match self.on_miss(epoch) {
                    Miss::Skip => {
                        debug!(change = self.next, "Skipping absent change");
                        self.next += 1;
                    }
                    Miss::Retry => {}
                    Miss::Park(woken) => {
                        tokio::select! {
                            _ = woken => {}
                            _ = self.closing.changed() => return None,
                        }
                    }
                },
                Err(StoreError::Closed) => return None,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }

    fn emit(&mut self, raw: Vec<u8>) -> Result<ReadItem> {
        let change = self.next;
        let value = if self.shape.wants_value() {
            match self.inner.encoding.decode(raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    self.done = true;
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        self.next += 1;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Ok(self.shape.format(change, value))
    }

    fn on_miss(&self, epoch: u64) -> Miss {
        let mut state = self.inner.lock();
        // A batch settled after the read; the miss may predate its commit.
        if state.waiters.epoch() != epoch {
            return Miss::Retry;
        }
        // Below the settled frontier an absent key was deleted or lost with a
        // failed batch; it will never appear.
        if matches!(state.gate, GateState::Resolved) && self.next < state.durable_next {
            return Miss::Skip;
        }
        match state.waiters.register(epoch) {
            Some(woken) => Miss::Park(woken),
            None => Miss::Retry,
        }
    }
}

/// Endless poll over the next change, parking between commits.
pub(crate) fn live(inner: Arc<Inner>, options: ReadOptions) -> FeedStream {
    let cursor = LiveCursor {
        next: options.since.map_or(inner.start, |since| since.saturating_add(1)),
        remaining: options.limit,
        shape: Shape::of(&options),
        closing: inner.store.closing(),
        inner,
        done: false,
    };

    stream::unfold(cursor, |mut cursor| async move {
        let item = cursor.next_item().await?;
        Some((item, cursor))
    })
    .boxed()
}
