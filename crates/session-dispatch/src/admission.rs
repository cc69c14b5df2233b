//! Pending → connected / rejected, decided on the control context.

use tracing::{debug, info, warn};

use crate::capability::Capabilities;
use crate::channel::{notify_disconnected, ReplyChannel};
use crate::controller::ControllerInfo;
use crate::dispatcher::ControlContext;
use crate::metrics;
use crate::registry::PendingConnection;

impl ControlContext {
    pub(crate) fn on_connect(&mut self, ticket: u64) {
        // Teardown already drained (and notified) the entry.
        let Some(PendingConnection { request, channel }) = self.core.registry.take_pending(ticket)
        else {
            debug!(target = "session.admission", ticket, "pending connection already gone");
            return;
        };
        if self.core.is_released() {
            self.reject(&request.identity.to_string(), &channel, "released");
            return;
        }

        let trusted = self.core.config.is_trusted(&request.identity);
        let info = ControllerInfo::new(request, trusted);
        if !trusted && !self.core.config.allow_untrusted {
            self.reject(&info.identity.to_string(), &channel, "untrusted");
            return;
        }

        let decision = self.policy.decide_admission(&info);
        let (capabilities, outcome) = if decision.accept {
            (decision.capabilities(), "accepted")
        } else if trusted {
            // Trusted callers are never hard-rejected.
            (Capabilities::empty(), "accepted_empty")
        } else {
            self.reject(&info.identity.to_string(), &channel, "policy");
            return;
        };

        let label = info.identity.to_string();
        let Some(record) = self
            .core
            .registry
            .admit(info, capabilities, channel.clone())
        else {
            self.reject(&label, &channel, "released");
            return;
        };

        let snapshot = self.resource.snapshot();
        if let Err(err) = record.announce(&self.core.config.session_id, snapshot) {
            warn!(
                target = "session.admission",
                controller = %record.identity(),
                error = %err,
                "initial state push failed; dropping controller"
            );
            self.core.registry.remove_record(&record);
            record.close();
            notify_disconnected(&channel);
            metrics::record_admission("channel_failed");
            return;
        }

        info!(
            target = "session.admission",
            controller = %record.identity(),
            trusted = record.info().trusted,
            player_commands = record.capabilities().player.len(),
            session_commands = record.capabilities().session.len(),
            outcome,
            "controller connected"
        );
        metrics::record_admission(outcome);
        self.policy.on_post_connect(record.info());
    }

    fn reject(&self, controller: &str, channel: &ReplyChannel, reason: &'static str) {
        info!(
            target = "session.admission",
            controller,
            reason,
            "connection rejected"
        );
        metrics::record_admission("rejected");
        notify_disconnected(channel);
    }
}
