//! Connected controllers and connections still waiting for a decision.
//!
//! The two sets are disjoint: a pending entry is taken out before its
//! controller can be admitted. Closing the registry drains both sets under
//! both locks, after which nothing can be added.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use controller_channel::ChannelResult;

use crate::capability::Capabilities;
use crate::channel::{ConnectionState, OutboundMessage, Outbox, ReplyChannel};
use crate::controller::{ConnectionRequest, ControllerIdentity, ControllerInfo};
use crate::correlator::{SequenceNumber, SequencedCorrelator};
use crate::metrics;
use crate::queue::{CommandQueue, QueuedCommand};
use crate::resource::PlayerSnapshot;
use crate::result::SessionResult;

pub struct ControllerRecord {
    info: ControllerInfo,
    capabilities: RwLock<Arc<Capabilities>>,
    correlator: Arc<SequencedCorrelator>,
    pub(crate) queue: CommandQueue<QueuedCommand>,
    pub(crate) outbox: Outbox,
    in_flight: Mutex<InFlight>,
    connected: AtomicBool,
    retired: AtomicBool,
}

/// Cancel handles for commands that have been accepted but not finished,
/// keyed by an internal ticket so reused request numbers stay distinct.
#[derive(Default)]
struct InFlight {
    next_ticket: u64,
    entries: HashMap<u64, (SequenceNumber, CancellationToken)>,
}

impl ControllerRecord {
    pub(crate) fn new(info: ControllerInfo, capabilities: Capabilities, channel: ReplyChannel) -> Self {
        let correlator = Arc::new(SequencedCorrelator::new());
        let outbox = Outbox::new(channel, Arc::clone(&correlator));
        Self {
            info,
            capabilities: RwLock::new(Arc::new(capabilities)),
            correlator,
            queue: CommandQueue::new(),
            outbox,
            in_flight: Mutex::new(InFlight::default()),
            connected: AtomicBool::new(true),
            retired: AtomicBool::new(false),
        }
    }

    pub fn info(&self) -> &ControllerInfo {
        &self.info
    }

    pub fn identity(&self) -> &ControllerIdentity {
        &self.info.identity
    }

    pub fn capabilities(&self) -> Arc<Capabilities> {
        Arc::clone(&self.capabilities.read())
    }

    pub fn correlator(&self) -> &Arc<SequencedCorrelator> {
        &self.correlator
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Replaced by a newer admission of the same identity.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Nothing queued and nothing in flight.
    pub fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.in_flight.lock().entries.is_empty()
    }

    /// Push the connection snapshot under the baseline sequence number.
    pub(crate) fn announce(
        &self,
        session_id: &str,
        player: PlayerSnapshot,
    ) -> ChannelResult<()> {
        self.outbox.announce(|seq| {
            let granted = self.capabilities();
            OutboundMessage::Connected {
                seq,
                state: ConnectionState {
                    session_id: session_id.to_string(),
                    protocol_version: self.info.protocol_version,
                    session_commands: granted.session.clone(),
                    player_commands: granted.player,
                    player,
                },
            }
        })
    }

    /// Swap the grant and notify the controller, in that order, under the
    /// outbox lock.
    pub(crate) fn replace_capabilities(&self, capabilities: Capabilities) -> ChannelResult<()> {
        self.outbox.push_numbered(|seq| {
            *self.capabilities.write() = Arc::new(capabilities.clone());
            (
                OutboundMessage::AvailableCommandsChanged { seq, capabilities },
                (),
            )
        })
    }

    /// Register an accepted command. The ticket is handed back to
    /// [`ControllerRecord::finish`] with its result.
    pub(crate) fn track(&self, request_seq: SequenceNumber) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let mut in_flight = self.in_flight.lock();
        if in_flight.entries.values().any(|(seq, _)| *seq == request_seq) {
            debug!(
                target = "session.registry",
                controller = %self.info.identity,
                request_seq,
                "request number reused while still in flight"
            );
        }
        let ticket = in_flight.next_ticket;
        in_flight.next_ticket += 1;
        in_flight
            .entries
            .insert(ticket, (request_seq, token.clone()));
        (ticket, token)
    }

    /// Cancel every unfinished command sent under `request_seq`.
    pub(crate) fn cancel(&self, request_seq: SequenceNumber) -> bool {
        let in_flight = self.in_flight.lock();
        let mut found = false;
        for (_, token) in in_flight
            .entries
            .values()
            .filter(|(seq, _)| *seq == request_seq)
        {
            token.cancel();
            found = true;
        }
        found
    }

    /// Deliver the result of a tracked command and forget its ticket.
    pub(crate) fn finish(&self, ticket: u64, request_seq: SequenceNumber, result: SessionResult) {
        self.in_flight.lock().entries.remove(&ticket);
        self.deliver_result(request_seq, result);
    }

    /// Deliver the terminal result for `request_seq`. Results for a
    /// controller that has gone away are discarded.
    pub(crate) fn deliver_result(&self, request_seq: SequenceNumber, result: SessionResult) {
        if !self.is_connected() {
            debug!(
                target = "session.dispatch",
                controller = %self.info.identity,
                request_seq,
                code = %result.code,
                "result discarded for disconnected controller"
            );
            return;
        }
        metrics::record_result(result.code);
        let code = result.code;
        if let Err(err) = self.outbox.push_result(request_seq, result) {
            warn!(
                target = "session.dispatch",
                controller = %self.info.identity,
                request_seq,
                %code,
                error = %err,
                "failed to push result"
            );
        }
    }

    /// Send the disconnect notice, then tear down.
    pub(crate) fn disconnect(&self) {
        self.outbox.push_disconnect();
        self.close();
    }

    /// Stop everything owned by this record. Pending waiters are released
    /// with a discarded outcome and in-flight commands are cancelled.
    pub(crate) fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.outbox.close();
        self.correlator.expire_all();
        let tokens: Vec<_> = self
            .in_flight
            .lock()
            .entries
            .drain()
            .map(|(_, (_, token))| token)
            .collect();
        for token in tokens {
            token.cancel();
        }
    }
}

impl std::fmt::Debug for ControllerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerRecord")
            .field("identity", &self.info.identity)
            .field("trusted", &self.info.trusted)
            .field("connected", &self.is_connected())
            .field("retired", &self.is_retired())
            .finish_non_exhaustive()
    }
}

pub struct PendingConnection {
    pub request: ConnectionRequest,
    pub channel: ReplyChannel,
}

#[derive(Default)]
struct PendingTable {
    next_ticket: u64,
    entries: HashMap<u64, PendingConnection>,
}

#[derive(Default)]
pub struct ControllerRegistry {
    connected: RwLock<HashMap<ControllerIdentity, Arc<ControllerRecord>>>,
    /// Records replaced by a newer admission, kept until they drain.
    retired: Mutex<Vec<Arc<ControllerRecord>>>,
    pending: Mutex<PendingTable>,
    closed: AtomicBool,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and insert the record for `info`. Returns `None` once the
    /// registry is closed. An existing record for the same identity is
    /// replaced and retired: it keeps draining whatever it already holds
    /// and is handed out by [`ControllerRegistry::take_drained_retired`]
    /// or [`ControllerRegistry::close`].
    pub fn admit(
        &self,
        info: ControllerInfo,
        capabilities: Capabilities,
        channel: ReplyChannel,
    ) -> Option<Arc<ControllerRecord>> {
        let mut connected = self.connected.write();
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let identity = info.identity.clone();
        let record = Arc::new(ControllerRecord::new(info, capabilities, channel));
        if let Some(previous) = connected.insert(identity.clone(), Arc::clone(&record)) {
            warn!(
                target = "session.registry",
                controller = %identity,
                queued = previous.queued_len(),
                "duplicate admission; replacing existing record"
            );
            previous.retired.store(true, Ordering::SeqCst);
            self.retired.lock().push(previous);
        }
        Some(record)
    }

    pub fn lookup(&self, identity: &ControllerIdentity) -> Option<Arc<ControllerRecord>> {
        self.connected.read().get(identity).cloned()
    }

    pub fn update_capabilities(
        &self,
        identity: &ControllerIdentity,
        capabilities: Capabilities,
    ) -> Option<ChannelResult<()>> {
        let record = self.lookup(identity)?;
        Some(record.replace_capabilities(capabilities))
    }

    pub fn remove(&self, identity: &ControllerIdentity) -> Option<Arc<ControllerRecord>> {
        self.connected.write().remove(identity)
    }

    /// Remove `record` only if it is still the registered one for its identity.
    pub fn remove_record(&self, record: &Arc<ControllerRecord>) -> bool {
        let mut connected = self.connected.write();
        match connected.get(record.identity()) {
            Some(current) if Arc::ptr_eq(current, record) => {
                connected.remove(record.identity());
                true
            }
            _ => false,
        }
    }

    /// Remove and return retired records with nothing left to deliver.
    pub fn take_drained_retired(&self) -> Vec<Arc<ControllerRecord>> {
        let mut retired = self.retired.lock();
        if retired.is_empty() {
            return Vec::new();
        }
        let (drained, busy): (Vec<_>, Vec<_>) =
            retired.drain(..).partition(|record| record.is_drained());
        *retired = busy;
        drained
    }

    pub fn retired_count(&self) -> usize {
        self.retired.lock().len()
    }

    pub fn list_connected(&self) -> Vec<Arc<ControllerRecord>> {
        self.connected.read().values().cloned().collect()
    }

    pub fn connected_count(&self) -> usize {
        self.connected.read().len()
    }

    /// Record a connection awaiting a decision. Hands the entry back once
    /// the registry is closed.
    pub fn add_pending(&self, pending: PendingConnection) -> Result<u64, PendingConnection> {
        let mut table = self.pending.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(pending);
        }
        let ticket = table.next_ticket;
        table.next_ticket += 1;
        table.entries.insert(ticket, pending);
        Ok(ticket)
    }

    pub fn take_pending(&self, ticket: u64) -> Option<PendingConnection> {
        self.pending.lock().entries.remove(&ticket)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().entries.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the registry and hand back everything it held, retired
    /// records included.
    pub fn close(&self) -> (Vec<Arc<ControllerRecord>>, Vec<PendingConnection>) {
        let mut pending = self.pending.lock();
        let mut connected = self.connected.write();
        self.closed.store(true, Ordering::SeqCst);
        let mut records: Vec<_> = connected.drain().map(|(_, record)| record).collect();
        records.append(&mut self.retired.lock());
        let waiting = pending.entries.drain().map(|(_, entry)| entry).collect();
        (records, waiting)
    }
}
