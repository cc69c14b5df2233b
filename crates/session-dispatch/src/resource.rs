//! Seam to the player-like resource commands are applied to.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::PlayerCommands;
use crate::command::{PlayerAction, SessionRequest};
use crate::controller::ControllerInfo;
use crate::result::{CommandError, CommandOutcome};

/// State of the resource as a controller sees it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub available_commands: PlayerCommands,
    #[serde(default)]
    pub state: Value,
}

pub enum Completion {
    Ready(CommandOutcome),
    /// Finishes later. Dropped without being polled if the command is
    /// cancelled first.
    Deferred(BoxFuture<'static, CommandOutcome>),
}

impl Completion {
    pub fn unsupported(name: &str) -> Self {
        Completion::Ready(Err(CommandError::Unsupported(name.to_string())))
    }
}

impl From<CommandOutcome> for Completion {
    fn from(outcome: CommandOutcome) -> Self {
        Completion::Ready(outcome)
    }
}

/// Only ever called from the session's control context.
pub trait PlayerResource: Send + 'static {
    fn apply(&mut self, controller: &ControllerInfo, action: &PlayerAction) -> Completion;

    fn handle_session_request(
        &mut self,
        controller: &ControllerInfo,
        request: &SessionRequest,
    ) -> Completion {
        let _ = controller;
        Completion::unsupported(request.name())
    }

    fn snapshot(&self) -> PlayerSnapshot;
}
