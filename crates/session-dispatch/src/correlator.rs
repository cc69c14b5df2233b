//! Per-controller sequence numbers and the table of results still owed.
//!
//! Numbers start at [`BASELINE_SEQUENCE`], which is always handed to the
//! connection announcement. Waiters registered with [`SequencedCorrelator::register_pending`]
//! resolve to `None` when the correlator is expired, so nobody waits on a
//! controller that is gone.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

use crate::result::SessionResult;

pub type SequenceNumber = u64;

pub const BASELINE_SEQUENCE: SequenceNumber = 0;

#[derive(Debug)]
pub struct SequencedCorrelator {
    next: AtomicU64,
    table: Mutex<PendingTable>,
}

#[derive(Debug, Default)]
struct PendingTable {
    waiters: HashMap<SequenceNumber, oneshot::Sender<SessionResult>>,
    expired: bool,
}

impl Default for SequencedCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl SequencedCorrelator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(BASELINE_SEQUENCE),
            table: Mutex::new(PendingTable::default()),
        }
    }

    pub fn next_sequence_number(&self) -> SequenceNumber {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    pub fn register_pending(&self, seq: SequenceNumber) -> PendingResult {
        let (tx, rx) = oneshot::channel();
        let mut table = self.table.lock();
        if !table.expired && table.waiters.insert(seq, tx).is_some() {
            trace!(target = "session.correlator", seq, "pending entry replaced");
        }
        PendingResult { seq, rx }
    }

    /// Allocate the next number and register a waiter for it.
    pub fn create_pending(&self) -> PendingResult {
        let seq = self.next_sequence_number();
        self.register_pending(seq)
    }

    /// Deliver `result` to the waiter for `seq`. Unknown, already resolved or
    /// expired numbers are ignored and report `false`.
    pub fn resolve(&self, seq: SequenceNumber, result: SessionResult) -> bool {
        let waiter = self.table.lock().waiters.remove(&seq);
        match waiter {
            Some(tx) => tx.send(result).is_ok(),
            None => {
                trace!(target = "session.correlator", seq, "late or duplicate result ignored");
                false
            }
        }
    }

    /// Drop every outstanding waiter; they observe a discarded outcome.
    pub fn expire_all(&self) {
        let drained: Vec<_> = {
            let mut table = self.table.lock();
            table.expired = true;
            table.waiters.drain().collect()
        };
        if !drained.is_empty() {
            trace!(
                target = "session.correlator",
                count = drained.len(),
                "expired pending results"
            );
        }
    }

    pub fn is_expired(&self) -> bool {
        self.table.lock().expired
    }

    pub fn pending_count(&self) -> usize {
        self.table.lock().waiters.len()
    }
}

/// Resolves to the delivered result, or `None` once the entry was discarded.
#[derive(Debug)]
pub struct PendingResult {
    seq: SequenceNumber,
    rx: oneshot::Receiver<SessionResult>,
}

impl PendingResult {
    pub fn sequence_number(&self) -> SequenceNumber {
        self.seq
    }
}

impl Future for PendingResult {
    type Output = Option<SessionResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}
