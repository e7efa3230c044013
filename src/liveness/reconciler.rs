use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::PulseConfig;
use crate::error::Result;
use crate::keys::{identity_from_heartbeat_key, HEARTBEAT_KEY_PATTERN};
use crate::liveness::policy::StalenessPolicy;
use crate::registry::{WorkerInfo, WorkerRegistry};
use crate::store::LivenessStore;
use crate::worker::WorkerId;

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Workers judged dead and deregistered
    pub pruned: Vec<WorkerId>,
    /// Heartbeat keys deleted because no registered worker owns them
    pub orphans_removed: Vec<String>,
    /// Why the pass stopped early, if it did
    pub error: Option<String>,
}

impl PruneReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_noop(&self) -> bool {
        self.pruned.is_empty() && self.orphans_removed.is_empty()
    }
}

/// Liveness of one registered worker at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub id: WorkerId,
    pub last_beat: Option<String>,
    pub started_at: Option<String>,
    pub alive: bool,
}

/// Brings the registry and the heartbeat keyspace back in line.
///
/// A pass deregisters every registered worker whose heartbeat is stale and
/// deletes every heartbeat key whose worker is not registered. Passes hold no
/// locks and may overlap with other passes, in this process or another one:
/// every write they issue is an idempotent delete.
pub struct Reconciler {
    store: Arc<dyn LivenessStore>,
    registry: Arc<dyn WorkerRegistry>,
    policy: StalenessPolicy,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn LivenessStore>,
        registry: Arc<dyn WorkerRegistry>,
        policy: StalenessPolicy,
    ) -> Self {
        Self {
            store,
            registry,
            policy,
        }
    }

    pub fn from_config(
        store: Arc<dyn LivenessStore>,
        registry: Arc<dyn WorkerRegistry>,
        config: &PulseConfig,
    ) -> Self {
        Self::new(
            store,
            registry,
            StalenessPolicy::new(config.staleness_threshold()),
        )
    }

    pub fn policy(&self) -> &StalenessPolicy {
        &self.policy
    }

    /// Deregister `worker` if its heartbeat is stale. Returns whether it was pruned.
    pub async fn prune_one(&self, worker: &WorkerInfo) -> Result<bool> {
        self.prune_one_at(worker, Utc::now()).await
    }

    pub async fn prune_one_at(&self, worker: &WorkerInfo, now: DateTime<Utc>) -> Result<bool> {
        let key = worker.id.heartbeat_key();
        let last_beat = self.store.get(&key).await?;
        if !self
            .policy
            .is_dead(last_beat.as_deref(), worker.started_at.as_deref(), now)
        {
            return Ok(false);
        }

        let decided_on = last_beat
            .as_deref()
            .or(worker.started_at.as_deref())
            .unwrap_or("never");
        tracing::info!(
            worker_id = %worker.id,
            last_beat = decided_on,
            "Pruning dead worker"
        );

        self.registry.deregister(&worker.id).await?;
        self.store.delete(&key).await?;
        Ok(true)
    }

    /// Run one full pass. Never fails; an aborted pass is logged and reported
    /// through [`PruneReport::error`], keeping whatever it managed before.
    pub async fn prune_all(&self) -> PruneReport {
        self.prune_all_at(Utc::now()).await
    }

    pub async fn prune_all_at(&self, now: DateTime<Utc>) -> PruneReport {
        let mut report = PruneReport::default();
        match self.reconcile(now, &mut report).await {
            Ok(()) => {
                if !report.is_noop() {
                    tracing::info!(
                        pruned = report.pruned.len(),
                        orphans_removed = report.orphans_removed.len(),
                        "Reconciliation pass finished"
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    pruned = report.pruned.len(),
                    orphans_removed = report.orphans_removed.len(),
                    "Reconciliation pass aborted"
                );
                report.error = Some(e.to_string());
            }
        }
        report
    }

    async fn reconcile(&self, now: DateTime<Utc>, report: &mut PruneReport) -> Result<()> {
        let mut candidates: HashSet<String> = self
            .store
            .list_keys(HEARTBEAT_KEY_PATTERN)
            .await?
            .into_iter()
            .collect();

        for worker in self.registry.current_workers().await? {
            if self.prune_one_at(&worker, now).await? {
                report.pruned.push(worker.id.clone());
            }
            candidates.remove(&worker.id.heartbeat_key());
        }

        let mut orphans: Vec<String> = candidates.into_iter().collect();
        orphans.sort();
        for key in orphans {
            tracing::info!(
                key = %key,
                worker_id = identity_from_heartbeat_key(&key).unwrap_or("?"),
                "Removing heartbeat, worker is no longer registered"
            );
            self.store.delete(&key).await?;
            report.orphans_removed.push(key);
        }
        Ok(())
    }

    /// Liveness of every registered worker, without changing anything.
    pub async fn status_at(&self, now: DateTime<Utc>) -> Result<Vec<WorkerStatus>> {
        let mut statuses = Vec::new();
        for worker in self.registry.current_workers().await? {
            let last_beat = self.store.get(&worker.id.heartbeat_key()).await?;
            let alive = !self
                .policy
                .is_dead(last_beat.as_deref(), worker.started_at.as_deref(), now);
            statuses.push(WorkerStatus {
                id: worker.id,
                last_beat,
                started_at: worker.started_at,
                alive,
            });
        }
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(statuses)
    }

    /// Run a pass every `interval` until `token` is cancelled, handing each
    /// pass's report to `on_report`.
    ///
    /// The first pass starts immediately. A pass in progress is never
    /// interrupted; cancellation is observed between passes.
    pub async fn run_periodic<F>(
        &self,
        interval: Duration,
        token: CancellationToken,
        mut on_report: F,
    )
    where
        F: FnMut(&PruneReport) + Send,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.prune_all().await;
                    tracing::debug!(
                        pruned = report.pruned.len(),
                        orphans_removed = report.orphans_removed.len(),
                        complete = report.is_complete(),
                        "Periodic prune"
                    );
                    on_report(&report);
                }
            }
        }
        tracing::debug!("Periodic pruner stopped");
    }
}
