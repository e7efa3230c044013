//! Store key layout shared with existing deployments.
//!
//! These names must not change: workers and pruners built from other code
//! bases read and write the same keys.

/// Set holding the identity of every registered worker.
pub const WORKERS_SET_KEY: &str = "workers";

/// Pattern matching every heartbeat key, whatever the worker identity.
pub const HEARTBEAT_KEY_PATTERN: &str = "worker:*:heartbeat";

const WORKER_PREFIX: &str = "worker:";
const HEARTBEAT_SUFFIX: &str = ":heartbeat";

/// `worker:<id>:heartbeat`
pub fn heartbeat_key(worker_id: &str) -> String {
    format!("{}{}{}", WORKER_PREFIX, worker_id, HEARTBEAT_SUFFIX)
}

/// `worker:<id>`, the worker's current-job slot
pub fn worker_key(worker_id: &str) -> String {
    format!("{}{}", WORKER_PREFIX, worker_id)
}

/// `worker:<id>:started`
pub fn started_key(worker_id: &str) -> String {
    format!("{}{}:started", WORKER_PREFIX, worker_id)
}

pub fn processed_stat_key(worker_id: &str) -> String {
    format!("stat:processed:{}", worker_id)
}

pub fn failed_stat_key(worker_id: &str) -> String {
    format!("stat:failed:{}", worker_id)
}

/// Recover the worker identity embedded in a heartbeat key.
pub fn identity_from_heartbeat_key(key: &str) -> Option<&str> {
    key.strip_prefix(WORKER_PREFIX)?
        .strip_suffix(HEARTBEAT_SUFFIX)
        .filter(|id| !id.is_empty())
}
