use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::keys;
use crate::liveness::policy::format_timestamp;
use crate::store::LivenessStore;
use crate::worker::WorkerId;

/// A registered worker as seen by the pruner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
    pub id: WorkerId,
    /// Raw start time as stored at registration, if any
    pub started_at: Option<String>,
}

impl WorkerInfo {
    pub fn new(id: impl Into<WorkerId>, started_at: Option<String>) -> Self {
        Self {
            id: id.into(),
            started_at,
        }
    }
}

/// Source of truth for which workers are registered.
///
/// `deregister` must be idempotent: two pruners may deregister the same
/// worker concurrently and both must succeed.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    async fn current_workers(&self) -> Result<Vec<WorkerInfo>>;

    async fn deregister(&self, worker_id: &WorkerId) -> Result<()>;
}

/// Registry kept in the shared store using the layout existing workers use:
/// membership in `workers`, start time at `worker:<id>:started`, plus the
/// current-job slot and per-worker stat counters that deregistration clears.
#[derive(Clone)]
pub struct StoreRegistry {
    store: Arc<dyn LivenessStore>,
}

impl StoreRegistry {
    pub fn new(store: Arc<dyn LivenessStore>) -> Self {
        Self { store }
    }

    pub async fn register(&self, worker_id: &WorkerId) -> Result<()> {
        self.register_at(worker_id, Utc::now()).await
    }

    /// Register `worker_id` with an explicit start time
    pub async fn register_at(&self, worker_id: &WorkerId, started_at: DateTime<Utc>) -> Result<()> {
        self.store
            .add_to_set(keys::WORKERS_SET_KEY, worker_id.as_str())
            .await?;
        self.store
            .set(
                &keys::started_key(worker_id.as_str()),
                &format_timestamp(started_at),
            )
            .await?;
        tracing::info!(worker_id = %worker_id, "Worker registered");
        Ok(())
    }
}

#[async_trait]
impl WorkerRegistry for StoreRegistry {
    async fn current_workers(&self) -> Result<Vec<WorkerInfo>> {
        let ids = self.store.set_members(keys::WORKERS_SET_KEY).await?;
        let mut workers = Vec::with_capacity(ids.len());
        for id in ids {
            let started_at = self.store.get(&keys::started_key(&id)).await?;
            workers.push(WorkerInfo::new(id, started_at));
        }
        Ok(workers)
    }

    async fn deregister(&self, worker_id: &WorkerId) -> Result<()> {
        let id = worker_id.as_str();
        self.store
            .remove_from_set(keys::WORKERS_SET_KEY, id)
            .await?;
        for key in [
            keys::worker_key(id),
            keys::started_key(id),
            keys::processed_stat_key(id),
            keys::failed_stat_key(id),
        ] {
            self.store.delete(&key).await?;
        }
        tracing::info!(worker_id = %worker_id, "Worker deregistered");
        Ok(())
    }
}
