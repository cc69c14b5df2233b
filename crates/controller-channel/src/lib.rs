//! One-way push channels from a session back to a single controller.
//!
//! A push never blocks and never waits for the remote side: it either hands the
//! message to the transport or reports that the channel is gone.

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("controller channel closed")]
    Closed,
    #[error("controller transport error: {0}")]
    Transport(String),
}

pub type ChannelResult<T> = Result<T, ChannelError>;

pub trait ControllerChannel<M>: Send + Sync {
    fn push(&self, message: M) -> ChannelResult<()>;

    /// Short label used in logs.
    fn describe(&self) -> String {
        "controller-channel".to_string()
    }
}

impl<M, F> ControllerChannel<M> for F
where
    F: Fn(M) -> ChannelResult<()> + Send + Sync,
{
    fn push(&self, message: M) -> ChannelResult<()> {
        (self)(message)
    }
}

/// In-process channel for tests and for hosts that bridge to a transport on
/// another task. The receiving half sees messages in push order.
pub struct LocalChannel<M> {
    label: String,
    tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<M>>>,
}

impl<M: Send> LocalChannel<M> {
    pub fn new(label: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<M>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Self {
            label: label.into(),
            tx: parking_lot::Mutex::new(Some(tx)),
        };
        (channel, rx)
    }

    /// Break the channel; subsequent pushes fail with [`ChannelError::Closed`].
    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }
}

impl<M: Send> ControllerChannel<M> for LocalChannel<M> {
    fn push(&self, message: M) -> ChannelResult<()> {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(ChannelError::Closed);
        };
        tx.send(message).map_err(|_| ChannelError::Closed)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

impl<M> fmt::Debug for LocalChannel<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalChannel")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Channel whose remote end is already gone. Useful for exercising
/// best-effort delivery paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeadChannel;

impl<M> ControllerChannel<M> for DeadChannel {
    fn push(&self, _message: M) -> ChannelResult<()> {
        Err(ChannelError::Closed)
    }

    fn describe(&self) -> String {
        "dead".to_string()
    }
}
