use std::fmt;

use serde::{Deserialize, Serialize};

use crate::keys;

/// Stable identity of a worker process.
///
/// Used verbatim as the member of the `workers` set and as the middle part of
/// the worker's heartbeat key, so it never changes while the worker runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `host:pid`
    pub fn from_parts(host: &str, pid: u32) -> Self {
        Self(format!("{}:{}", host, pid))
    }

    /// Identity of the running process, from `$HOSTNAME` and the process id.
    pub fn for_current_process() -> Self {
        let host = std::env::var("HOSTNAME")
            .ok()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        Self::from_parts(&host, std::process::id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn heartbeat_key(&self) -> String {
        keys::heartbeat_key(&self.0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for WorkerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parts_joins_host_and_pid() {
        let id = WorkerId::from_parts("host1", 111);
        assert_eq!(id.as_str(), "host1:111");
        assert_eq!(id.to_string(), "host1:111");
        assert_eq!(id.heartbeat_key(), "worker:host1:111:heartbeat");
    }

    #[test]
    fn current_process_identity_ends_with_pid() {
        let id = WorkerId::for_current_process();
        let suffix = format!(":{}", std::process::id());
        assert!(id.as_str().ends_with(&suffix), "{id}");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = WorkerId::new("host1:111");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"host1:111\"");
    }
}
