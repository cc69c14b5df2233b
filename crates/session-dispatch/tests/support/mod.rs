#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use controller_channel::LocalChannel;
use parking_lot::Mutex;
use serde_json::json;
use session_dispatch::{
    Capabilities, Command, CommandError, CommandOutcome, Completion, ConnectionRequest,
    ControllerIdentity, ControllerInfo, OutboundMessage, PlayerAction, PlayerCommands,
    PlayerResource, PlayerSnapshot, SequenceNumber, SessionHandle, SessionRequest,
    SessionResult,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(2);

type Held = HashMap<&'static str, VecDeque<oneshot::Receiver<CommandOutcome>>>;
type Gates = HashMap<&'static str, VecDeque<GateSide>>;

struct GateSide {
    entered: std::sync::mpsc::Sender<()>,
    open: std::sync::mpsc::Receiver<()>,
}

/// Keeps the control context parked inside `apply` until opened. Only
/// usable from multi-threaded runtimes.
pub struct Gate {
    entered: std::sync::mpsc::Receiver<()>,
    open: std::sync::mpsc::Sender<()>,
}

impl Gate {
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(WAIT)
            .expect("gated action never started");
    }

    pub fn open(self) {
        let _ = self.open.send(());
    }
}

/// Player that records every action it is asked to apply.
pub struct RecordingPlayer {
    tape: Tape,
}

#[derive(Clone, Default)]
pub struct Tape {
    applied: Arc<Mutex<Vec<(u64, PlayerAction)>>>,
    requests: Arc<Mutex<Vec<(u64, SessionRequest)>>>,
    held: Arc<Mutex<Held>>,
    gates: Arc<Mutex<Gates>>,
}

impl RecordingPlayer {
    pub fn new() -> (Self, Tape) {
        let tape = Tape::default();
        (
            Self {
                tape: tape.clone(),
            },
            tape,
        )
    }
}

impl Tape {
    /// The next action named `name` completes only when the returned sender
    /// fires (or resolves to an error if it is dropped).
    pub fn hold(&self, name: &'static str) -> oneshot::Sender<CommandOutcome> {
        let (tx, rx) = oneshot::channel();
        self.held.lock().entry(name).or_default().push_back(rx);
        tx
    }

    /// The next action named `name` blocks the control context until the
    /// returned gate is opened.
    pub fn gate(&self, name: &'static str) -> Gate {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (open_tx, open_rx) = std::sync::mpsc::channel();
        self.gates.lock().entry(name).or_default().push_back(GateSide {
            entered: entered_tx,
            open: open_rx,
        });
        Gate {
            entered: entered_rx,
            open: open_tx,
        }
    }

    pub fn applied(&self) -> Vec<(u64, PlayerAction)> {
        self.applied.lock().clone()
    }

    pub fn applied_by(&self, endpoint: u64) -> Vec<PlayerAction> {
        self.applied
            .lock()
            .iter()
            .filter(|(who, _)| *who == endpoint)
            .map(|(_, action)| action.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<(u64, SessionRequest)> {
        self.requests.lock().clone()
    }

    pub async fn wait_applied(&self, count: usize) {
        timeout(WAIT, async {
            while self.applied.lock().len() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("player never saw the expected actions");
    }
}

impl PlayerResource for RecordingPlayer {
    fn apply(&mut self, controller: &ControllerInfo, action: &PlayerAction) -> Completion {
        self.tape
            .applied
            .lock()
            .push((controller.identity.endpoint, action.clone()));
        let gate = self
            .tape
            .gates
            .lock()
            .get_mut(action.name())
            .and_then(VecDeque::pop_front);
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.open.recv_timeout(WAIT);
        }
        if let PlayerAction::SetTrackSelectionParameters { .. } = action {
            return Completion::unsupported(action.name());
        }
        let held = self
            .tape
            .held
            .lock()
            .get_mut(action.name())
            .and_then(VecDeque::pop_front);
        match held {
            Some(rx) => Completion::Deferred(Box::pin(async move {
                rx.await
                    .unwrap_or_else(|_| Err(CommandError::Failed("gate dropped".into())))
            })),
            None => Completion::Ready(Ok(SessionResult::success())),
        }
    }

    fn handle_session_request(
        &mut self,
        controller: &ControllerInfo,
        request: &SessionRequest,
    ) -> Completion {
        self.tape
            .requests
            .lock()
            .push((controller.identity.endpoint, request.clone()));
        match request {
            SessionRequest::GetLibraryRoot { .. } => {
                Completion::Ready(Ok(SessionResult::success_with(json!({"media_id": "root"}))))
            }
            SessionRequest::Custom(command) if command.action == "echo" => {
                Completion::Ready(Ok(SessionResult::success_with(command.args.clone())))
            }
            other => Completion::unsupported(other.name()),
        }
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            available_commands: PlayerCommands::all(),
            state: json!({"playing": false}),
        }
    }
}

pub fn identity(endpoint: u64) -> ControllerIdentity {
    ControllerIdentity::new(
        endpoint,
        "com.example.remote",
        4_000 + endpoint as u32,
        10_000 + endpoint as u32,
    )
}

pub fn trusted_identity(endpoint: u64) -> ControllerIdentity {
    ControllerIdentity::new(endpoint, "com.example.system", 4_000 + endpoint as u32, 1000)
}

pub type Inbox = mpsc::UnboundedReceiver<OutboundMessage>;

/// Start admission for `identity` without waiting for the outcome.
pub fn request_connect(session: &SessionHandle, identity: ControllerIdentity) -> Inbox {
    let (channel, rx) = LocalChannel::<OutboundMessage>::new(identity.to_string());
    let _ = session.connect(ConnectionRequest::new(identity, 1), Arc::new(channel));
    rx
}

/// Connect and wait for the announcement.
pub async fn connect(
    session: &SessionHandle,
    identity: ControllerIdentity,
) -> (Inbox, Capabilities) {
    let mut rx = request_connect(session, identity);
    match next_message(&mut rx).await {
        OutboundMessage::Connected { seq, state } => {
            assert_eq!(seq, 0);
            let granted = Capabilities::new(state.session_commands, state.player_commands);
            (rx, granted)
        }
        other => panic!("expected connected, got {other:?}"),
    }
}

pub async fn next_message(rx: &mut Inbox) -> OutboundMessage {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for push")
        .expect("channel closed")
}

pub async fn next_result(rx: &mut Inbox) -> (SequenceNumber, SessionResult) {
    match next_message(rx).await {
        OutboundMessage::Result {
            request_seq,
            result,
            ..
        } => (request_seq, result),
        other => panic!("expected result, got {other:?}"),
    }
}

/// Collect `count` results keyed by the request number they answer.
pub async fn results(rx: &mut Inbox, count: usize) -> HashMap<SequenceNumber, SessionResult> {
    let mut out = HashMap::new();
    for _ in 0..count {
        let (request_seq, result) = next_result(rx).await;
        out.insert(request_seq, result);
    }
    out
}

pub fn seek(position_ms: i64) -> Command {
    Command::Player(PlayerAction::SeekTo { position_ms })
}

pub fn play() -> Command {
    Command::Player(PlayerAction::Play)
}
