//! Live-tail waiter registry.
//!
//! Live readers that miss on the next change park here until a batch commit
//! releases them. A release only means "retry now"; the reader re-reads and
//! may park again.

use tokio::sync::oneshot;

/// FIFO list of parked live readers plus a release epoch.
///
/// The epoch closes the gap between a reader's miss and its registration: a
/// reader snapshots the epoch before reading, and registration is refused if
/// a release happened in between.
#[derive(Debug, Default)]
pub(crate) struct WaiterRegistry {
    epoch: u64,
    waiters: Vec<oneshot::Sender<()>>,
}

impl WaiterRegistry {
    /// Current release epoch.
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Park a reader that observed `seen_epoch` before its read.
    ///
    /// Returns `None` when a release already happened since; the reader should
    /// retry immediately.
    pub(crate) fn register(&mut self, seen_epoch: u64) -> Option<oneshot::Receiver<()>> {
        if seen_epoch != self.epoch {
            return None;
        }
        // Readers dropped while parked leave closed senders behind.
        self.waiters.retain(|tx| !tx.is_closed());

        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        Some(rx)
    }

    /// Detach every parked reader and advance the epoch.
    ///
    /// Registrations made after this call land in a fresh list.
    pub(crate) fn take_all(&mut self) -> Released {
        self.epoch = self.epoch.wrapping_add(1);
        Released(std::mem::take(&mut self.waiters))
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }
}

/// Readers detached by [`WaiterRegistry::take_all`], woken outside the state lock.
#[must_use]
pub(crate) struct Released(Vec<oneshot::Sender<()>>);

impl Released {
    /// Wake every reader in registration order. Returns how many were still listening.
    pub(crate) fn wake(self) -> usize {
        self.0.into_iter().filter_map(|tx| tx.send(()).ok()).count()
    }
}
