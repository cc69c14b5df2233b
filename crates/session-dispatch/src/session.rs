//! Public handle over a running session.
//!
//! Every method returns without waiting for the control context. Outcomes
//! travel back to controllers through their reply channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capability::Capabilities;
use crate::channel::{notify_disconnected, OutboundMessage, ReplyChannel};
use crate::command::{Command, CustomCommand};
use crate::config::SessionConfig;
use crate::controller::{ConnectionRequest, ControllerIdentity, ControllerInfo};
use crate::correlator::{PendingResult, SequenceNumber};
use crate::dispatcher::{teardown_without_context, ControlContext, ControlTask};
use crate::error::SessionError;
use crate::metrics;
use crate::policy::{SessionPolicy, StaticPolicy};
use crate::registry::{ControllerRegistry, PendingConnection};
use crate::resource::PlayerResource;
use crate::result::{ResultCode, SessionResult};

pub(crate) struct SessionCore {
    pub(crate) config: SessionConfig,
    pub(crate) registry: ControllerRegistry,
    released: AtomicBool,
}

impl SessionCore {
    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// What happened to an inbound command call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Handed to the control context ahead of any teardown; exactly one
    /// result will follow.
    Accepted,
    Dropped(DropReason),
    /// The session is released. This is the command's `SessionDisconnected`
    /// outcome. A call that raced the teardown may also see a
    /// `SessionDisconnected` result pushed ahead of the disconnect notice.
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    UnknownController,
    Malformed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerSnapshot {
    pub controller: ControllerInfo,
    pub capabilities: Capabilities,
    pub queued: usize,
}

pub struct SessionBuilder {
    resource: Box<dyn PlayerResource>,
    policy: Box<dyn SessionPolicy>,
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn new(resource: impl PlayerResource) -> Self {
        Self {
            resource: Box::new(resource),
            policy: Box::new(StaticPolicy::allow_all()),
            config: SessionConfig::default(),
        }
    }

    pub fn policy(mut self, policy: impl SessionPolicy) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the control context. Must be called inside a tokio runtime.
    pub fn spawn(self) -> SessionHandle {
        let core = Arc::new(SessionCore {
            config: self.config,
            registry: ControllerRegistry::new(),
            released: AtomicBool::new(false),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let context = ControlContext::new(
            Arc::clone(&core),
            self.resource,
            self.policy,
            tx.downgrade(),
        );
        let worker = tokio::spawn(context.run(rx));
        info!(
            target = "session.control",
            session_id = %core.config.session_id,
            "session started"
        );
        SessionHandle {
            core,
            tx,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }
}

#[derive(Clone)]
pub struct SessionHandle {
    core: Arc<SessionCore>,
    tx: mpsc::UnboundedSender<ControlTask>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.core.config.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    pub fn is_released(&self) -> bool {
        self.core.is_released()
    }

    /// Begin admission for a controller. The outcome arrives on `channel`:
    /// a `Connected` announcement or a `Disconnected` notice.
    pub fn connect(
        &self,
        request: ConnectionRequest,
        channel: ReplyChannel,
    ) -> Result<(), SessionError> {
        debug!(
            target = "session.admission",
            controller = %request.identity,
            protocol_version = request.protocol_version,
            "connection requested"
        );
        let ticket = match self
            .core
            .registry
            .add_pending(PendingConnection { request, channel })
        {
            Ok(ticket) => ticket,
            Err(pending) => {
                info!(
                    target = "session.admission",
                    controller = %pending.request.identity,
                    "connection refused; session released"
                );
                metrics::record_admission("rejected");
                notify_disconnected(&pending.channel);
                return Err(SessionError::Released);
            }
        };
        if self.tx.send(ControlTask::Connect { ticket }).is_err() {
            if let Some(pending) = self.core.registry.take_pending(ticket) {
                notify_disconnected(&pending.channel);
            }
            return Err(SessionError::ControlContextGone);
        }
        Ok(())
    }

    /// Hand `command` to the control context. `request_seq` is the caller's
    /// own number and is echoed back with the result.
    pub fn dispatch(
        &self,
        identity: &ControllerIdentity,
        request_seq: SequenceNumber,
        command: Command,
    ) -> Dispatched {
        if self.core.is_released() {
            metrics::record_result(ResultCode::SessionDisconnected);
            return Dispatched::Disconnected;
        }
        let Some(record) = self.core.registry.lookup(identity) else {
            debug!(
                target = "session.dispatch",
                controller = %identity,
                request_seq,
                command = command.name(),
                "ignoring command from unknown controller"
            );
            metrics::record_drop("unknown_controller");
            return Dispatched::Dropped(DropReason::UnknownController);
        };
        if let Err(err) = command.validate() {
            warn!(
                target = "session.dispatch",
                controller = %identity,
                request_seq,
                command = command.name(),
                error = %err,
                "ignoring malformed command"
            );
            metrics::record_drop("malformed");
            return Dispatched::Dropped(DropReason::Malformed);
        }
        let task = ControlTask::Dispatch {
            record,
            request_seq,
            command,
        };
        // Release raises the flag before queueing its shutdown task, so a
        // task sent while the flag is still down runs before the shutdown.
        match self.tx.send(task) {
            Ok(()) if self.core.is_released() => Dispatched::Disconnected,
            Ok(()) => Dispatched::Accepted,
            Err(_) => Dispatched::Disconnected,
        }
    }

    /// Drop this controller's queued commands that have not started yet.
    /// Each dropped command resolves to `Skipped`.
    pub fn flush_command_queue(&self, identity: &ControllerIdentity) -> bool {
        let Some(record) = self.core.registry.lookup(identity) else {
            return false;
        };
        self.tx.send(ControlTask::Flush { record }).is_ok()
    }

    /// Cancel a dispatched command. Resolves to `Skipped` unless it already
    /// finished.
    pub fn cancel_command(&self, identity: &ControllerIdentity, request_seq: SequenceNumber) -> bool {
        self.core
            .registry
            .lookup(identity)
            .map(|record| record.cancel(request_seq))
            .unwrap_or(false)
    }

    /// Remove a controller that asked to leave or whose transport went away.
    /// Queued work and outstanding results are discarded.
    pub fn release_controller(&self, identity: &ControllerIdentity) -> bool {
        let Some(record) = self.core.registry.remove(identity) else {
            return false;
        };
        record.close();
        info!(
            target = "session.admission",
            controller = %identity,
            "controller released"
        );
        let _ = self.tx.send(ControlTask::Disconnected {
            info: record.info().clone(),
        });
        true
    }

    /// Result from a controller for a custom command this session sent it.
    pub fn on_controller_result(
        &self,
        identity: &ControllerIdentity,
        seq: SequenceNumber,
        result: SessionResult,
    ) -> bool {
        match self.core.registry.lookup(identity) {
            Some(record) => record.correlator().resolve(seq, result),
            None => false,
        }
    }

    /// Send a custom command to a controller. The returned future resolves
    /// with the controller's answer, or `None` if it disconnects first.
    pub fn send_custom_command(
        &self,
        identity: &ControllerIdentity,
        command: CustomCommand,
    ) -> Result<PendingResult, SessionError> {
        let record = self
            .core
            .registry
            .lookup(identity)
            .ok_or_else(|| SessionError::UnknownController(identity.clone()))?;
        let correlator = Arc::clone(record.correlator());
        let pending = record.outbox.push_numbered(|seq| {
            let pending = correlator.register_pending(seq);
            (OutboundMessage::CustomCommand { seq, command }, pending)
        })?;
        Ok(pending)
    }

    /// Replace a controller's grant. The controller is told about the change;
    /// commands already queued are not re-checked.
    pub fn set_available_commands(
        &self,
        identity: &ControllerIdentity,
        capabilities: Capabilities,
    ) -> Result<(), SessionError> {
        match self.core.registry.update_capabilities(identity, capabilities) {
            Some(pushed) => Ok(pushed?),
            None => Err(SessionError::UnknownController(identity.clone())),
        }
    }

    /// Push the resource's current state to every connected controller.
    pub fn notify_player_state_changed(&self) {
        let _ = self.tx.send(ControlTask::BroadcastPlayerState);
    }

    pub fn connected_controllers(&self) -> Vec<ControllerSnapshot> {
        let mut controllers: Vec<_> = self
            .core
            .registry
            .list_connected()
            .into_iter()
            .map(|record| ControllerSnapshot {
                controller: record.info().clone(),
                capabilities: (*record.capabilities()).clone(),
                queued: record.queued_len(),
            })
            .collect();
        controllers.sort_by_key(|snapshot| snapshot.controller.identity.endpoint);
        controllers
    }

    pub fn pending_connections(&self) -> usize {
        self.core.registry.pending_count()
    }

    /// Tear the session down. Every connected and pending controller is told
    /// it is disconnected; later calls resolve to `SessionDisconnected`.
    /// Safe to call more than once.
    pub async fn release(&self) {
        if !self.core.released.swap(true, Ordering::SeqCst) {
            let (records, pending) = self.core.registry.close();
            let (done_tx, done_rx) = oneshot::channel();
            let task = ControlTask::Shutdown {
                records,
                pending,
                done: done_tx,
            };
            match self.tx.send(task) {
                Ok(()) => {
                    let _ = done_rx.await;
                }
                Err(mpsc::error::SendError(task)) => {
                    if let ControlTask::Shutdown {
                        records, pending, ..
                    } = task
                    {
                        teardown_without_context(records, pending);
                    }
                }
            }
        }
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                warn!(target = "session.control", error = %err, "control context ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.core.config.session_id)
            .field("released", &self.core.is_released())
            .finish_non_exhaustive()
    }
}
