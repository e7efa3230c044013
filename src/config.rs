use std::time::Duration;

use crate::error::{PulseError, Result};

/// Timing parameters for heartbeats and pruning.
///
/// The defaults leave room for at most two missed beats before a worker is
/// judged dead. Tune `heartbeat_interval_ms` and `staleness_threshold_ms`
/// together.
#[derive(Debug, Clone)]
pub struct PulseConfig {
    /// Pause between two beats of a worker's emitter
    pub heartbeat_interval_ms: u64,
    /// Maximum age of a heartbeat before its worker is considered dead
    pub staleness_threshold_ms: u64,
    /// Upper bound on how long `stop()` waits for the emitter loop to exit
    /// and for the heartbeat key cleanup to finish
    pub stop_timeout_ms: u64,
    /// Pause between two passes of the periodic pruner
    pub prune_interval_ms: u64,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 2000,
            staleness_threshold_ms: 5000,
            stop_timeout_ms: 1000,
            prune_interval_ms: 10_000,
        }
    }
}

impl PulseConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_millis(self.staleness_threshold_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms)
    }

    pub fn with_heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }

    pub fn with_staleness_threshold_ms(mut self, ms: u64) -> Self {
        self.staleness_threshold_ms = ms;
        self
    }

    pub fn with_stop_timeout_ms(mut self, ms: u64) -> Self {
        self.stop_timeout_ms = ms;
        self
    }

    pub fn with_prune_interval_ms(mut self, ms: u64) -> Self {
        self.prune_interval_ms = ms;
        self
    }

    /// Reject durations that would make a loop spin or a worker die instantly.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("staleness_threshold_ms", self.staleness_threshold_ms),
            ("stop_timeout_ms", self.stop_timeout_ms),
            ("prune_interval_ms", self.prune_interval_ms),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(PulseError::Config(format!("{} must be positive", name)));
            }
        }
        if self.staleness_threshold_ms < self.heartbeat_interval_ms {
            tracing::warn!(
                heartbeat_interval_ms = self.heartbeat_interval_ms,
                staleness_threshold_ms = self.staleness_threshold_ms,
                "Staleness threshold is shorter than the heartbeat interval, live workers will be pruned"
            );
        }
        Ok(())
    }
}

/// Connection settings for the shared store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Redis URL, e.g. `redis://127.0.0.1:6379/0`
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}
