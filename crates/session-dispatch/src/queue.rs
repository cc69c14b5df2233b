//! Per-controller FIFO of commands waiting for the control context.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::capability::PlayerCommand;
use crate::command::Command;
use crate::correlator::SequenceNumber;

/// Commands applied the moment they reach the control context, ahead of
/// anything already queued for the same controller.
pub const IMMEDIATE_COMMANDS: &[PlayerCommand] = &[PlayerCommand::SetVideoSurface];

pub fn is_immediate(command: &Command) -> bool {
    match command {
        Command::Player(action) => IMMEDIATE_COMMANDS.contains(&action.required_command()),
        Command::Session(_) => false,
    }
}

#[derive(Debug)]
pub(crate) struct QueuedCommand {
    pub request_seq: SequenceNumber,
    pub ticket: u64,
    pub command: Command,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
pub struct CommandQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> Default for CommandQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> CommandQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, item: T) {
        self.items.lock().push_back(item);
    }

    pub fn pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Remove everything not yet started, oldest first.
    pub fn flush(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
