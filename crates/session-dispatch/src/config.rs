use std::collections::HashSet;

use crate::controller::ControllerIdentity;

pub const DEFAULT_SESSION_ID: &str = "session-1";
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub session_id: String,
    pub trusted_uids: HashSet<u32>,
    pub trusted_packages: HashSet<String>,
    /// Uid of the hosting process; always trusted.
    pub host_uid: Option<u32>,
    /// When false, untrusted callers are turned away before the policy runs.
    pub allow_untrusted: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: DEFAULT_SESSION_ID.into(),
            trusted_uids: [0, 1000].into_iter().collect(),
            trusted_packages: HashSet::new(),
            host_uid: None,
            allow_untrusted: true,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let session_id = lookup("SESSION_ID").unwrap_or(defaults.session_id);
        let trusted_uids = lookup("SESSION_TRUSTED_UIDS")
            .map(|v| split_list(&v).filter_map(|s| s.parse().ok()).collect())
            .unwrap_or(defaults.trusted_uids);
        let trusted_packages = lookup("SESSION_TRUSTED_PACKAGES")
            .map(|v| split_list(&v).map(str::to_string).collect())
            .unwrap_or(defaults.trusted_packages);
        let host_uid = lookup("SESSION_HOST_UID").and_then(|v| v.trim().parse().ok());
        let allow_untrusted = lookup("SESSION_ALLOW_UNTRUSTED")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.allow_untrusted);
        Self {
            session_id,
            trusted_uids,
            trusted_packages,
            host_uid,
            allow_untrusted,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn trust_uid(mut self, uid: u32) -> Self {
        self.trusted_uids.insert(uid);
        self
    }

    pub fn trust_package(mut self, package: impl Into<String>) -> Self {
        self.trusted_packages.insert(package.into());
        self
    }

    pub fn reject_untrusted(mut self) -> Self {
        self.allow_untrusted = false;
        self
    }

    pub fn is_trusted(&self, identity: &ControllerIdentity) -> bool {
        self.host_uid == Some(identity.uid)
            || self.trusted_uids.contains(&identity.uid)
            || self.trusted_packages.contains(&identity.package)
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// `1`, `true`, `yes` or `on`, in any case.
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = SessionConfig::from_lookup(lookup(&[]));
        assert_eq!(config.session_id, DEFAULT_SESSION_ID);
        assert!(config.trusted_uids.contains(&1000));
        assert!(config.allow_untrusted);
        assert_eq!(config.host_uid, None);
    }

    #[test]
    fn env_values_override_defaults() {
        let config = SessionConfig::from_lookup(lookup(&[
            ("SESSION_ID", "kitchen"),
            ("SESSION_TRUSTED_UIDS", "42, 43,,bad"),
            ("SESSION_TRUSTED_PACKAGES", "com.example.launcher"),
            ("SESSION_HOST_UID", "10077"),
            ("SESSION_ALLOW_UNTRUSTED", "off"),
        ]));
        assert_eq!(config.session_id, "kitchen");
        assert_eq!(config.trusted_uids, HashSet::from([42, 43]));
        assert!(!config.allow_untrusted);

        assert!(config.is_trusted(&ControllerIdentity::new(1, "x", 1, 42)));
        assert!(config.is_trusted(&ControllerIdentity::new(1, "x", 1, 10077)));
        assert!(config.is_trusted(&ControllerIdentity::new(
            1,
            "com.example.launcher",
            1,
            5
        )));
        assert!(!config.is_trusted(&ControllerIdentity::new(1, "x", 1, 1000)));
    }
}
