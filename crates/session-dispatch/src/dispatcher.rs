//! The session's single control context.
//!
//! Every resource call and every policy hook runs here, on one task, one at a
//! time. Inbound calls only enqueue [`ControlTask`]s; commands that pass the
//! checks land in their controller's queue and are run in arrival order.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

use crate::channel::{notify_disconnected, OutboundMessage};
use crate::command::Command;
use crate::controller::ControllerInfo;
use crate::correlator::SequenceNumber;
use crate::metrics;
use crate::policy::{PreCheck, SessionPolicy};
use crate::queue::{self, QueuedCommand};
use crate::registry::{ControllerRecord, PendingConnection};
use crate::resource::{Completion, PlayerResource};
use crate::result::{normalize, CommandError, ResultCode};
use crate::session::SessionCore;

pub(crate) enum ControlTask {
    Connect {
        ticket: u64,
    },
    Dispatch {
        record: Arc<ControllerRecord>,
        request_seq: SequenceNumber,
        command: Command,
    },
    Flush {
        record: Arc<ControllerRecord>,
    },
    Disconnected {
        info: ControllerInfo,
    },
    BroadcastPlayerState,
    /// Disconnect replaced records that have finished draining.
    Reap,
    Shutdown {
        records: Vec<Arc<ControllerRecord>>,
        pending: Vec<PendingConnection>,
        done: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub(crate) struct ControlContext {
    pub(crate) core: Arc<SessionCore>,
    pub(crate) resource: Box<dyn PlayerResource>,
    pub(crate) policy: Box<dyn SessionPolicy>,
    run_order: VecDeque<Arc<ControllerRecord>>,
    wake: mpsc::WeakUnboundedSender<ControlTask>,
}

impl ControlContext {
    pub(crate) fn new(
        core: Arc<SessionCore>,
        resource: Box<dyn PlayerResource>,
        policy: Box<dyn SessionPolicy>,
        wake: mpsc::WeakUnboundedSender<ControlTask>,
    ) -> Self {
        Self {
            core,
            resource,
            policy,
            run_order: VecDeque::new(),
            wake,
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ControlTask>) {
        let mut inbound_open = true;
        loop {
            if self.run_order.is_empty() {
                self.reap_retired();
                if !inbound_open {
                    break;
                }
                match rx.recv().await {
                    Some(task) => {
                        if self.handle(task) == Flow::Stop {
                            break;
                        }
                    }
                    None => break,
                }
            }
            // Take in everything that has arrived so immediate commands and
            // flushes act before older queued work.
            while inbound_open {
                match rx.try_recv() {
                    Ok(task) => {
                        if self.handle(task) == Flow::Stop {
                            return;
                        }
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => inbound_open = false,
                }
            }
            self.run_next();
            tokio::task::yield_now().await;
        }
        trace!(target = "session.control", "control context stopped");
    }

    fn handle(&mut self, task: ControlTask) -> Flow {
        match task {
            ControlTask::Connect { ticket } => self.on_connect(ticket),
            ControlTask::Dispatch {
                record,
                request_seq,
                command,
            } => self.on_dispatch(record, request_seq, command),
            ControlTask::Flush { record } => self.on_flush(&record),
            ControlTask::Disconnected { info } => self.policy.on_disconnected(&info),
            ControlTask::BroadcastPlayerState => self.broadcast_player_state(),
            ControlTask::Reap => self.reap_retired(),
            ControlTask::Shutdown {
                records,
                pending,
                done,
            } => {
                self.shutdown(records, pending);
                let _ = done.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn on_dispatch(
        &mut self,
        record: Arc<ControllerRecord>,
        request_seq: SequenceNumber,
        command: Command,
    ) {
        if self.core.is_released() {
            record.deliver_result(request_seq, ResultCode::SessionDisconnected.into());
            return;
        }
        if !record.is_connected() {
            debug!(
                target = "session.dispatch",
                controller = %record.identity(),
                request_seq,
                "controller gone before dispatch; dropping"
            );
            metrics::record_drop("not_connected");
            return;
        }

        let allowed = record.capabilities().is_available(&command.required());
        if !allowed {
            debug!(
                target = "session.dispatch",
                controller = %record.identity(),
                request_seq,
                command = command.name(),
                required = %command.required(),
                "permission denied"
            );
            record.deliver_result(request_seq, ResultCode::PermissionDenied.into());
            return;
        }

        if let PreCheck::Reject(code) = self.policy.pre_check(record.info(), &command) {
            if !code.is_success() {
                debug!(
                    target = "session.dispatch",
                    controller = %record.identity(),
                    request_seq,
                    command = command.name(),
                    %code,
                    "vetoed by pre-check"
                );
                record.deliver_result(request_seq, code.into());
                return;
            }
        }

        let (ticket, cancel) = record.track(request_seq);
        let queued = QueuedCommand {
            request_seq,
            ticket,
            command,
            cancel,
        };
        if queue::is_immediate(&queued.command) {
            trace!(
                target = "session.dispatch",
                controller = %record.identity(),
                request_seq,
                command = queued.command.name(),
                "applying immediately"
            );
            self.execute(&record, queued);
        } else {
            record.queue.enqueue(queued);
            self.run_order.push_back(record);
        }
    }

    fn on_flush(&mut self, record: &Arc<ControllerRecord>) {
        let dropped = record.queue.flush();
        if dropped.is_empty() {
            return;
        }
        debug!(
            target = "session.dispatch",
            controller = %record.identity(),
            count = dropped.len(),
            "flushed queued commands"
        );
        metrics::QUEUE_FLUSHED.inc_by(dropped.len() as u64);
        for queued in dropped {
            record.finish(queued.ticket, queued.request_seq, ResultCode::Skipped.into());
        }
    }

    fn run_next(&mut self) {
        let Some(record) = self.run_order.pop_front() else {
            return;
        };
        // Entries outlive flushed commands; an empty queue here is expected.
        let Some(queued) = record.queue.pop() else {
            return;
        };
        if !record.is_connected() {
            trace!(
                target = "session.dispatch",
                controller = %record.identity(),
                request_seq = queued.request_seq,
                "dropping queued command for disconnected controller"
            );
            return;
        }
        self.execute(&record, queued);
    }

    fn execute(&mut self, record: &Arc<ControllerRecord>, queued: QueuedCommand) {
        let QueuedCommand {
            request_seq,
            ticket,
            command,
            cancel,
        } = queued;
        if self.core.is_released() {
            record.finish(ticket, request_seq, ResultCode::SessionDisconnected.into());
            return;
        }
        if cancel.is_cancelled() {
            record.finish(ticket, request_seq, ResultCode::Skipped.into());
            return;
        }

        let completion = match &command {
            Command::Player(action) => self.resource.apply(record.info(), action),
            Command::Session(request) => {
                self.resource.handle_session_request(record.info(), request)
            }
        };
        match completion {
            Completion::Ready(outcome) => record.finish(ticket, request_seq, normalize(outcome)),
            Completion::Deferred(future) => {
                trace!(
                    target = "session.dispatch",
                    controller = %record.identity(),
                    request_seq,
                    command = command.name(),
                    "awaiting deferred outcome"
                );
                let record = Arc::clone(record);
                let wake = self.wake.clone();
                tokio::spawn(async move {
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(CommandError::Cancelled),
                        outcome = future => outcome,
                    };
                    record.finish(ticket, request_seq, normalize(outcome));
                    if record.is_retired() {
                        if let Some(tx) = wake.upgrade() {
                            let _ = tx.send(ControlTask::Reap);
                        }
                    }
                });
            }
        }
    }

    fn reap_retired(&mut self) {
        for record in self.core.registry.take_drained_retired() {
            debug!(
                target = "session.admission",
                controller = %record.identity(),
                "replaced record drained; disconnecting"
            );
            record.disconnect();
            self.policy.on_disconnected(record.info());
        }
    }

    fn broadcast_player_state(&mut self) {
        let snapshot = self.resource.snapshot();
        for record in self.core.registry.list_connected() {
            let state = snapshot.clone();
            let pushed = record
                .outbox
                .push_numbered(|seq| (OutboundMessage::PlayerStateChanged { seq, state }, ()));
            if let Err(err) = pushed {
                debug!(
                    target = "session.dispatch",
                    controller = %record.identity(),
                    error = %err,
                    "player state push failed"
                );
            }
        }
    }

    fn shutdown(&mut self, records: Vec<Arc<ControllerRecord>>, pending: Vec<PendingConnection>) {
        info!(
            target = "session.control",
            session_id = %self.core.config.session_id,
            controllers = records.len(),
            pending = pending.len(),
            "releasing session"
        );
        self.run_order.clear();
        for record in records {
            for queued in record.queue.flush() {
                record.finish(
                    queued.ticket,
                    queued.request_seq,
                    ResultCode::SessionDisconnected.into(),
                );
            }
            record.disconnect();
            self.policy.on_disconnected(record.info());
        }
        for entry in pending {
            notify_disconnected(&entry.channel);
        }
    }
}

/// Teardown used when the control context is no longer running.
pub(crate) fn teardown_without_context(
    records: Vec<Arc<ControllerRecord>>,
    pending: Vec<PendingConnection>,
) {
    for record in records {
        for queued in record.queue.flush() {
            record.finish(
                queued.ticket,
                queued.request_seq,
                ResultCode::SessionDisconnected.into(),
            );
        }
        record.disconnect();
    }
    for entry in pending {
        notify_disconnected(&entry.channel);
    }
}
