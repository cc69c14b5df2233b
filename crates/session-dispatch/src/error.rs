use controller_channel::ChannelError;
use thiserror::Error;

use crate::controller::ControllerIdentity;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session released")]
    Released,
    #[error("control context stopped")]
    ControlContextGone,
    #[error("controller {0} is not connected")]
    UnknownController(ControllerIdentity),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}
