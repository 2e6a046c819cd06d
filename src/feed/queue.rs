//! Append queue with micro-batched commits.
//!
//! Appends accepted before the next flush runs are written together in one
//! atomic batch. The flush is spawned when the first item lands in an empty
//! batch and yields once before detaching, so appends issued in the same tick
//! coalesce.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use super::{Entry, FeedError, FeedState, Inner, Result};
use super::gate::GateState;
use crate::codec;
use crate::encoding::Value;
use crate::storage::BatchOp;

type Responder = oneshot::Sender<Result<Entry>>;

/// An append waiting for the baseline.
pub(crate) struct ParkedAppend {
    value: Value,
    raw: Vec<u8>,
    responder: Responder,
}

impl ParkedAppend {
    pub(crate) fn fail(self, error: FeedError) {
        let _ = self.responder.send(Err(error));
    }
}

/// An append with its number, waiting for the next flush.
pub(crate) struct PendingItem {
    change: u64,
    key: Vec<u8>,
    raw: Vec<u8>,
    value: Value,
    responder: Responder,
}

/// Completion of one append.
///
/// Resolves to the committed entry, or to the error shared by its batch.
#[must_use = "appends complete without being awaited; await to observe the result"]
pub struct Append {
    rx: oneshot::Receiver<Result<Entry>>,
}

impl Future for Append {
    type Output = Result<Entry>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(FeedError::Cancelled)))
    }
}

impl Inner {
    pub(crate) fn append(self: &Arc<Self>, value: Value) -> Append {
        let (responder, rx) = oneshot::channel();

        // Completions carry the stored form so they match later reads.
        let encoded = self.encoding.normalize(value).and_then(|value| {
            let raw = self.encoding.encode(&value)?;
            let stored = self.encoding.decode(raw.clone())?;
            Ok((raw, stored))
        });
        let (raw, value) = match encoded {
            Ok(pair) => pair,
            Err(e) => {
                let _ = responder.send(Err(e.into()));
                return Append { rx };
            }
        };

        let mut state = self.lock();
        state.queued += 1;
        state.tentative_next = state.tentative_next.saturating_add(1);

        let parked = ParkedAppend {
            value,
            raw,
            responder,
        };
        if matches!(state.gate, GateState::Resolved) {
            self.assign(&mut state, parked);
        } else {
            state.parked.push(parked);
            self.kick_gate(&mut state);
        }

        Append { rx }
    }

    /// Give an append the next number and queue it for the next flush.
    pub(crate) fn assign(self: &Arc<Self>, state: &mut FeedState, parked: ParkedAppend) {
        let change = state.next_change;
        let Some(next) = change.checked_add(1) else {
            warn!(last = change - 1, "Change numbers exhausted");
            state.queued = state.queued.saturating_sub(1);
            state.tentative_next = state.next_change;
            parked.fail(FeedError::Exhausted { last: change - 1 });
            return;
        };
        state.next_change = next;

        state.pending_batch.push(PendingItem {
            change,
            key: codec::encode(change),
            raw: parked.raw,
            value: parked.value,
            responder: parked.responder,
        });

        if !state.flush_scheduled {
            state.flush_scheduled = true;
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                inner.flush().await;
            });
        }
    }

    #[tracing::instrument(name = "feed.flush", skip_all)]
    async fn flush(&self) {
        let _write = self.write_lock.lock().await;

        let batch = {
            let mut state = self.lock();
            state.flush_scheduled = false;
            std::mem::take(&mut state.pending_batch)
        };
        let Some(last) = batch.last().map(|item| item.change) else {
            return;
        };
        let first = batch[0].change;

        let mut ops = Vec::with_capacity(batch.len());
        let mut completions = Vec::with_capacity(batch.len());
        for item in batch {
            ops.push(BatchOp::Put {
                key: item.key,
                value: item.raw,
            });
            completions.push((item.change, item.value, item.responder));
        }

        let result = self.store.batch(ops).await;

        let released = {
            let mut state = self.lock();
            state.queued = state.queued.saturating_sub(completions.len() as u64);
            state.durable_next = state.durable_next.max(last + 1);
            state.waiters.take_all()
        };
        let woken = released.wake();

        match result {
            Ok(()) => {
                debug!(
                    first,
                    last,
                    size = completions.len(),
                    woken,
                    "Batch committed"
                );
                for (change, value, responder) in completions {
                    let _ = responder.send(Ok(Entry { change, value }));
                }
            }
            Err(e) => {
                error!(
                    first,
                    last,
                    size = completions.len(),
                    error = %e,
                    "Batch commit failed"
                );
                let shared = Arc::new(e);
                for (_, _, responder) in completions {
                    let _ = responder.send(Err(FeedError::BatchCommit(Arc::clone(&shared))));
                }
            }
        }
    }
}
