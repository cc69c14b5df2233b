//! Controller admission and command dispatch for a shared media session.
//!
//! Controllers talk to the session over one-way channels. A [`SessionHandle`]
//! accepts their calls from any thread, checks them against each controller's
//! current [`Capabilities`], and applies them to a [`PlayerResource`] one at a
//! time on a single control task, in the order each controller sent them.
//! Results and state pushes go back as [`OutboundMessage`]s numbered by a
//! per-controller [`SequencedCorrelator`].

mod admission;
pub mod capability;
pub mod channel;
pub mod command;
pub mod config;
pub mod controller;
pub mod correlator;
mod dispatcher;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod queue;
pub mod registry;
pub mod resource;
pub mod result;
pub mod session;

pub use capability::{
    Capabilities, PlayerCommand, PlayerCommands, RequiredCapability, SessionCommand,
    SessionCommandCode, SessionCommands,
};
pub use channel::{ConnectionState, OutboundMessage, ReplyChannel};
pub use command::{
    Command, CustomCommand, MalformedCommand, MediaItem, PlayerAction, Rating, RepeatMode,
    SessionRequest, SurfaceId,
};
pub use config::SessionConfig;
pub use controller::{ConnectionRequest, ControllerIdentity, ControllerInfo};
pub use correlator::{PendingResult, SequenceNumber, SequencedCorrelator, BASELINE_SEQUENCE};
pub use error::SessionError;
pub use policy::{AdmissionDecision, PreCheck, SessionPolicy, StaticPolicy};
pub use resource::{Completion, PlayerResource, PlayerSnapshot};
pub use result::{normalize, CommandError, CommandOutcome, ResultCode, SessionResult};
pub use session::{ControllerSnapshot, Dispatched, DropReason, SessionBuilder, SessionHandle};
