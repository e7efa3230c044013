use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PulseConfig;
use crate::error::Result;
use crate::keys::WORKERS_SET_KEY;
use crate::liveness::policy::format_timestamp;
use crate::store::LivenessStore;
use crate::worker::WorkerId;

struct RunningLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Background task proving that one worker is alive.
///
/// Every `interval` the loop re-adds the worker to the `workers` set and
/// writes the current time to its heartbeat key. A failed beat is logged and
/// the loop carries on; a worker that cannot reach the store is left for a
/// pruner to collect instead of being crashed.
///
/// `start` and `stop` must be called from within a tokio runtime.
pub struct HeartbeatEmitter {
    worker_id: WorkerId,
    store: Arc<dyn LivenessStore>,
    interval: Duration,
    stop_timeout: Duration,
    running: Option<RunningLoop>,
}

impl HeartbeatEmitter {
    pub fn new(worker_id: WorkerId, store: Arc<dyn LivenessStore>, interval: Duration) -> Self {
        Self {
            worker_id,
            store,
            interval,
            stop_timeout: PulseConfig::default().stop_timeout(),
            running: None,
        }
    }

    pub fn from_config(
        worker_id: WorkerId,
        store: Arc<dyn LivenessStore>,
        config: &PulseConfig,
    ) -> Self {
        Self::new(worker_id, store, config.heartbeat_interval())
            .with_stop_timeout(config.stop_timeout())
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Spawn the beat loop. Does nothing if a loop is already running.
    pub fn start(&mut self) {
        if self.is_running() {
            tracing::debug!(worker_id = %self.worker_id, "Heartbeat already running");
            return;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(Self::run(
            self.worker_id.clone(),
            self.store.clone(),
            self.interval,
            token.clone(),
        ));
        self.running = Some(RunningLoop { token, handle });

        tracing::info!(
            worker_id = %self.worker_id,
            interval_ms = self.interval.as_millis() as u64,
            "Heartbeat started"
        );
    }

    async fn run(
        worker_id: WorkerId,
        store: Arc<dyn LivenessStore>,
        interval: Duration,
        token: CancellationToken,
    ) {
        loop {
            // Only the sleep is cancellable; a beat in progress always finishes
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            if let Err(e) = beat(store.as_ref(), &worker_id).await {
                tracing::error!(
                    worker_id = %worker_id,
                    error = %e,
                    "Unable to set the heartbeat"
                );
            }
        }
        tracing::debug!(worker_id = %worker_id, "Heartbeat loop exited");
    }

    /// Perform a single beat immediately, outside the loop.
    pub async fn beat(&self) -> Result<()> {
        beat(self.store.as_ref(), &self.worker_id).await
    }

    /// Stop the loop and remove this worker's heartbeat key.
    ///
    /// Waits at most `stop_timeout` for the loop to exit and as long again
    /// for the key deletion. Never fails: cleanup problems are logged and the
    /// key is left for a pruner.
    pub async fn stop(&mut self) {
        if let Some(RunningLoop { token, handle }) = self.running.take() {
            token.cancel();
            match tokio::time::timeout(self.stop_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        worker_id = %self.worker_id,
                        error = %e,
                        "Heartbeat task ended abnormally"
                    );
                }
                Err(_) => {
                    // Dropping the handle detaches the task; it exits after its current beat
                    tracing::warn!(
                        worker_id = %self.worker_id,
                        timeout_ms = self.stop_timeout.as_millis() as u64,
                        "Heartbeat loop did not exit in time, detaching"
                    );
                }
            }
        }

        let key = self.worker_id.heartbeat_key();
        match tokio::time::timeout(self.stop_timeout, self.store.delete(&key)).await {
            Ok(Ok(())) => {
                tracing::info!(worker_id = %self.worker_id, "Heartbeat stopped");
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    worker_id = %self.worker_id,
                    key = %key,
                    error = %e,
                    "Failed to remove heartbeat key"
                );
            }
            Err(_) => {
                tracing::warn!(
                    worker_id = %self.worker_id,
                    key = %key,
                    "Timed out removing heartbeat key"
                );
            }
        }
    }
}

impl Drop for HeartbeatEmitter {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.token.cancel();
        }
    }
}

async fn beat(store: &dyn LivenessStore, worker_id: &WorkerId) -> Result<()> {
    store
        .add_to_set(WORKERS_SET_KEY, worker_id.as_str())
        .await?;
    store
        .set(&worker_id.heartbeat_key(), &format_timestamp(Utc::now()))
        .await?;
    tracing::debug!(worker_id = %worker_id, "Heartbeat");
    Ok(())
}
