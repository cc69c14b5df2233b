use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Success,
    PermissionDenied,
    NotSupported,
    SessionDisconnected,
    Skipped,
    UnknownError,
}

impl ResultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::Success => "success",
            ResultCode::PermissionDenied => "permission_denied",
            ResultCode::NotSupported => "not_supported",
            ResultCode::SessionDisconnected => "session_disconnected",
            ResultCode::Skipped => "skipped",
            ResultCode::UnknownError => "unknown_error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultCode::Success)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one dispatched command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub code: ResultCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl SessionResult {
    pub fn success() -> Self {
        Self::from_code(ResultCode::Success)
    }

    pub fn success_with(payload: Value) -> Self {
        Self {
            code: ResultCode::Success,
            payload: Some(payload),
        }
    }

    pub fn from_code(code: ResultCode) -> Self {
        Self {
            code,
            payload: None,
        }
    }
}

impl From<ResultCode> for SessionResult {
    fn from(code: ResultCode) -> Self {
        SessionResult::from_code(code)
    }
}

/// Failure reported by the player resource.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("operation not supported: {0}")]
    Unsupported(String),
    #[error("command cancelled")]
    Cancelled,
    #[error("command failed: {0}")]
    Failed(String),
}

pub type CommandOutcome = Result<SessionResult, CommandError>;

/// Collapse any resource outcome into exactly one [`SessionResult`].
pub fn normalize(outcome: CommandOutcome) -> SessionResult {
    match outcome {
        Ok(result) => result,
        Err(CommandError::Cancelled) => ResultCode::Skipped.into(),
        Err(CommandError::Unsupported(_)) => ResultCode::NotSupported.into(),
        Err(CommandError::Failed(_)) => ResultCode::UnknownError.into(),
    }
}
