//! Baseline discovery.
//!
//! The first operation that needs the baseline starts one reverse, limit-1
//! key read. Everyone who asks while it runs shares its outcome. Failures are
//! not cached: the gate drops back to unresolved and the next caller reads
//! again.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::{FeedError, FeedState, Inner, Result};
use crate::codec;
use crate::storage::IterOptions;

pub(crate) enum GateState {
    Unresolved,
    InProgress(Vec<oneshot::Sender<Result<()>>>),
    Resolved,
}

impl Inner {
    pub(crate) async fn ensure_ready(self: &Arc<Self>) -> Result<()> {
        let rx = {
            let mut state = self.lock();
            if matches!(state.gate, GateState::Resolved) {
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            self.kick_gate(&mut state);
            if let GateState::InProgress(waiters) = &mut state.gate {
                waiters.push(tx);
            }
            rx
        };
        rx.await.unwrap_or(Err(FeedError::Cancelled))
    }

    /// Start discovery if nobody has. Must be called with the state lock held.
    pub(crate) fn kick_gate(self: &Arc<Self>, state: &mut FeedState) {
        if !matches!(state.gate, GateState::Unresolved) {
            return;
        }
        state.gate = GateState::InProgress(Vec::new());

        // Detached so a caller dropping its future cannot strand the gate in progress.
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = inner.discover_baseline().await;
            inner.resolve_gate(outcome);
        });
    }

    /// Highest change currently in the store, if any.
    async fn discover_baseline(&self) -> Result<Option<u64>> {
        let options = IterOptions {
            reverse: true,
            limit: Some(1),
            values: false,
            ..IterOptions::default()
        };
        let init_err = |e| FeedError::Init(Arc::new(e));

        let mut records = self.store.iter(options).await.map_err(init_err)?;
        match records.next().await {
            None => Ok(None),
            Some(record) => {
                let record = record.map_err(init_err)?;
                match record.key {
                    Some(key) => Ok(Some(codec::decode(&key)?)),
                    None => Ok(None),
                }
            }
        }
    }

    fn resolve_gate(self: &Arc<Self>, outcome: Result<Option<u64>>) {
        let (waiters, failed) = {
            let mut state = self.lock();
            let waiters = match std::mem::replace(&mut state.gate, GateState::Unresolved) {
                GateState::InProgress(waiters) => waiters,
                _ => Vec::new(),
            };

            match &outcome {
                Ok(baseline) => {
                    if let Some(last) = baseline {
                        state.next_change = last.saturating_add(1);
                    }
                    state.durable_next = state.next_change;
                    state.tentative_next = state
                        .next_change
                        .saturating_add(state.parked.len() as u64);
                    state.gate = GateState::Resolved;

                    info!(
                        start = self.start,
                        change = ?state.next_change.checked_sub(1),
                        parked = state.parked.len(),
                        "Feed baseline discovered"
                    );

                    for parked in std::mem::take(&mut state.parked) {
                        self.assign(&mut state, parked);
                    }
                    (waiters, Vec::new())
                }
                Err(e) => {
                    // Parked appends never got a number; take back what they counted.
                    let parked = std::mem::take(&mut state.parked);
                    let n = parked.len() as u64;
                    state.queued = state.queued.saturating_sub(n);
                    state.tentative_next = state.tentative_next.saturating_sub(n);

                    warn!(
                        error = %e,
                        failed_appends = n,
                        "Feed baseline discovery failed; will retry on next use"
                    );
                    (waiters, parked)
                }
            }
        };

        for waiter in waiters {
            let _ = waiter.send(outcome.as_ref().map(|_| ()).map_err(Clone::clone));
        }
        if let Err(e) = &outcome {
            for parked in failed {
                parked.fail(e.clone());
            }
        }
    }
}
