//! Outbound messages and the ordered per-controller outbox.
//!
//! Every push to a controller passes through its [`Outbox`], which mints the
//! sequence number and hands the message to the channel under one lock. The
//! order in which a controller observes sequence numbers is therefore the order
//! in which they were minted.

use std::sync::Arc;

use controller_channel::{ChannelError, ChannelResult, ControllerChannel};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::capability::{Capabilities, PlayerCommands, SessionCommands};
use crate::command::CustomCommand;
use crate::correlator::{SequenceNumber, SequencedCorrelator, BASELINE_SEQUENCE};
use crate::resource::PlayerSnapshot;
use crate::result::SessionResult;

pub type ReplyChannel = Arc<dyn ControllerChannel<OutboundMessage>>;

/// Initial state announced to a freshly admitted controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub session_id: String,
    pub protocol_version: u32,
    pub session_commands: SessionCommands,
    pub player_commands: PlayerCommands,
    pub player: PlayerSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Connected {
        seq: SequenceNumber,
        state: ConnectionState,
    },
    /// `request_seq` echoes the number the controller attached to its call.
    Result {
        seq: SequenceNumber,
        request_seq: SequenceNumber,
        result: SessionResult,
    },
    AvailableCommandsChanged {
        seq: SequenceNumber,
        capabilities: Capabilities,
    },
    PlayerStateChanged {
        seq: SequenceNumber,
        state: PlayerSnapshot,
    },
    CustomCommand {
        seq: SequenceNumber,
        command: CustomCommand,
    },
    Disconnected {
        seq: SequenceNumber,
    },
}

impl OutboundMessage {
    pub fn seq(&self) -> SequenceNumber {
        match self {
            OutboundMessage::Connected { seq, .. }
            | OutboundMessage::Result { seq, .. }
            | OutboundMessage::AvailableCommandsChanged { seq, .. }
            | OutboundMessage::PlayerStateChanged { seq, .. }
            | OutboundMessage::CustomCommand { seq, .. }
            | OutboundMessage::Disconnected { seq } => *seq,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Connected { .. } => "connected",
            OutboundMessage::Result { .. } => "result",
            OutboundMessage::AvailableCommandsChanged { .. } => "available_commands_changed",
            OutboundMessage::PlayerStateChanged { .. } => "player_state_changed",
            OutboundMessage::CustomCommand { .. } => "custom_command",
            OutboundMessage::Disconnected { .. } => "disconnected",
        }
    }
}

/// Best-effort disconnect notice on a channel that has no outbox (pending or
/// rejected connections). Failures are only logged; the remote end is assumed gone.
pub(crate) fn notify_disconnected(channel: &ReplyChannel) {
    if let Err(err) = channel.push(OutboundMessage::Disconnected {
        seq: BASELINE_SEQUENCE,
    }) {
        debug!(
            target = "session.channel",
            channel = %channel.describe(),
            error = %err,
            "disconnect notice not delivered"
        );
    }
}

pub(crate) struct Outbox {
    channel: ReplyChannel,
    correlator: Arc<SequencedCorrelator>,
    announce_seq: SequenceNumber,
    state: Mutex<OutboxState>,
}

#[derive(Default)]
struct OutboxState {
    announced: bool,
    closed: bool,
    backlog: Vec<OutboundMessage>,
}

impl Outbox {
    /// Reserves the correlator's first number for the announcement, so this
    /// must run before anything else draws from `correlator`.
    pub(crate) fn new(channel: ReplyChannel, correlator: Arc<SequencedCorrelator>) -> Self {
        let announce_seq = correlator.next_sequence_number();
        Self {
            channel,
            correlator,
            announce_seq,
            state: Mutex::new(OutboxState::default()),
        }
    }

    /// Push the announcement built by `build`, then anything that was queued
    /// up behind it.
    pub(crate) fn announce<F>(&self, build: F) -> ChannelResult<()>
    where
        F: FnOnce(SequenceNumber) -> OutboundMessage,
    {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        self.channel.push(build(self.announce_seq))?;
        state.announced = true;
        for message in std::mem::take(&mut state.backlog) {
            trace!(
                target = "session.channel",
                seq = message.seq(),
                kind = message.kind(),
                "flushing held message"
            );
            self.channel.push(message)?;
        }
        Ok(())
    }

    /// Mint a number and push the message `build` produces for it. The
    /// closure runs under the outbox lock, so any state it swaps is observed
    /// by the controller in the same order as the notifications.
    pub(crate) fn push_numbered<F, R>(&self, build: F) -> ChannelResult<R>
    where
        F: FnOnce(SequenceNumber) -> (OutboundMessage, R),
    {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        let seq = self.correlator.next_sequence_number();
        let (message, value) = build(seq);
        if state.announced {
            self.channel.push(message)?;
        } else {
            state.backlog.push(message);
        }
        Ok(value)
    }

    pub(crate) fn push_result(
        &self,
        request_seq: SequenceNumber,
        result: SessionResult,
    ) -> ChannelResult<()> {
        self.push_numbered(|seq| {
            (
                OutboundMessage::Result {
                    seq,
                    request_seq,
                    result,
                },
                (),
            )
        })
    }

    /// Send the disconnect notice and close. Later pushes fail.
    pub(crate) fn push_disconnect(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.backlog.clear();
        notify_disconnected(&self.channel);
    }

    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.backlog.clear();
    }
}
