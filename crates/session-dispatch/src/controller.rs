use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key of one connected transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerIdentity {
    /// Raw token handed out by the transport for this endpoint.
    pub endpoint: u64,
    pub package: String,
    pub pid: u32,
    pub uid: u32,
}

impl ControllerIdentity {
    pub fn new(endpoint: u64, package: impl Into<String>, pid: u32, uid: u32) -> Self {
        Self {
            endpoint,
            package: package.into(),
            pid,
            uid,
        }
    }
}

impl fmt::Display for ControllerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(pid={},uid={})#{}",
            self.package, self.pid, self.uid, self.endpoint
        )
    }
}

/// What a controller declares when it asks to connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub identity: ControllerIdentity,
    pub protocol_version: u32,
    #[serde(default)]
    pub hints: Value,
}

impl ConnectionRequest {
    pub fn new(identity: ControllerIdentity, protocol_version: u32) -> Self {
        Self {
            identity,
            protocol_version,
            hints: Value::Null,
        }
    }

    pub fn with_hints(mut self, hints: Value) -> Self {
        self.hints = hints;
        self
    }
}

/// Identity plus the facts settled during admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerInfo {
    pub identity: ControllerIdentity,
    pub protocol_version: u32,
    pub trusted: bool,
    #[serde(default)]
    pub hints: Value,
}

impl ControllerInfo {
    pub fn new(request: ConnectionRequest, trusted: bool) -> Self {
        Self {
            identity: request.identity,
            protocol_version: request.protocol_version,
            trusted,
            hints: request.hints,
        }
    }
}
