//! Session-supplied decisions: who gets in, with what, and last-moment vetoes.

use crate::capability::{Capabilities, PlayerCommands, SessionCommands};
use crate::command::Command;
use crate::controller::ControllerInfo;
use crate::result::ResultCode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDecision {
    pub accept: bool,
    pub session_commands: SessionCommands,
    pub player_commands: PlayerCommands,
}

impl AdmissionDecision {
    pub fn accept(capabilities: Capabilities) -> Self {
        Self {
            accept: true,
            session_commands: capabilities.session,
            player_commands: capabilities.player,
        }
    }

    pub fn reject() -> Self {
        Self {
            accept: false,
            session_commands: SessionCommands::empty(),
            player_commands: PlayerCommands::EMPTY,
        }
    }

    pub fn capabilities(self) -> Capabilities {
        Capabilities::new(self.session_commands, self.player_commands)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreCheck {
    Pass,
    /// Short-circuits with this code. A `Success` veto is treated as a pass.
    Reject(ResultCode),
}

/// Hooks run on the control context. Only admission is mandatory.
pub trait SessionPolicy: Send + 'static {
    fn decide_admission(&mut self, controller: &ControllerInfo) -> AdmissionDecision;

    fn pre_check(&mut self, controller: &ControllerInfo, command: &Command) -> PreCheck {
        let _ = (controller, command);
        PreCheck::Pass
    }

    fn on_post_connect(&mut self, controller: &ControllerInfo) {
        let _ = controller;
    }

    fn on_disconnected(&mut self, controller: &ControllerInfo) {
        let _ = controller;
    }
}

/// Grants the same capabilities to every caller, optionally only trusted ones.
#[derive(Debug, Clone)]
pub struct StaticPolicy {
    grant: Capabilities,
    trusted_only: bool,
}

impl StaticPolicy {
    pub fn new(grant: Capabilities) -> Self {
        Self {
            grant,
            trusted_only: false,
        }
    }

    pub fn allow_all() -> Self {
        Self::new(Capabilities::everything())
    }

    pub fn trusted_only(mut self) -> Self {
        self.trusted_only = true;
        self
    }
}

impl Default for StaticPolicy {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl SessionPolicy for StaticPolicy {
    fn decide_admission(&mut self, controller: &ControllerInfo) -> AdmissionDecision {
        if self.trusted_only && !controller.trusted {
            return AdmissionDecision::reject();
        }
        AdmissionDecision::accept(self.grant.clone())
    }
}
