use session_dispatch::{
    AdmissionDecision, Capabilities, ControllerInfo, PlayerCommand, PlayerCommands,
    SessionCommandCode, SessionCommands, SessionPolicy,
};
use tracing::info;

/// Trusted controllers get everything. Others may drive playback and browse
/// the library but cannot touch the playlist, volume or rendering surface.
#[derive(Debug, Clone)]
pub struct HostPolicy {
    untrusted: Capabilities,
}

impl Default for HostPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPolicy {
    pub fn new() -> Self {
        let player = [
            PlayerCommand::PlayPause,
            PlayerCommand::Prepare,
            PlayerCommand::Stop,
            PlayerCommand::SeekToDefaultPosition,
            PlayerCommand::SeekInCurrentItem,
            PlayerCommand::SeekBack,
            PlayerCommand::SeekForward,
            PlayerCommand::SeekToPrevious,
            PlayerCommand::SeekToPreviousItem,
            PlayerCommand::SeekToNext,
            PlayerCommand::SeekToNextItem,
        ]
        .into_iter()
        .collect::<PlayerCommands>();
        let session = SessionCommandCode::ALL
            .into_iter()
            .filter(SessionCommandCode::is_library)
            .fold(SessionCommands::empty(), |set, code| set.with(code))
            .with(SessionCommandCode::SetRating);
        Self {
            untrusted: Capabilities::new(session, player),
        }
    }

    pub fn untrusted_grant(&self) -> &Capabilities {
        &self.untrusted
    }
}

impl SessionPolicy for HostPolicy {
    fn decide_admission(&mut self, controller: &ControllerInfo) -> AdmissionDecision {
        if controller.trusted {
            AdmissionDecision::accept(Capabilities::everything())
        } else {
            AdmissionDecision::accept(self.untrusted.clone())
        }
    }

    fn on_post_connect(&mut self, controller: &ControllerInfo) {
        info!(
            target = "session_host.policy",
            controller = %controller.identity,
            trusted = controller.trusted,
            "controller ready"
        );
    }

    fn on_disconnected(&mut self, controller: &ControllerInfo) {
        info!(
            target = "session_host.policy",
            controller = %controller.identity,
            "controller gone"
        );
    }
}
