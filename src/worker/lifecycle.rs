use std::sync::Arc;

use crate::config::PulseConfig;
use crate::error::Result;
use crate::keys;
use crate::liveness::{Reconciler, StalenessPolicy};
use crate::registry::{StoreRegistry, WorkerInfo, WorkerRegistry};
use crate::store::LivenessStore;
use crate::worker::{HeartbeatEmitter, WorkerId};

/// A worker process's view of its own registration and heartbeat.
///
/// The job-processing side calls [`Worker::startup`] once it is ready to take
/// work and [`Worker::shutdown`] on its way out.
pub struct Worker {
    id: WorkerId,
    store: Arc<dyn LivenessStore>,
    registry: StoreRegistry,
    config: PulseConfig,
    heart: Option<HeartbeatEmitter>,
}

impl Worker {
    pub fn new(id: WorkerId, store: Arc<dyn LivenessStore>, config: PulseConfig) -> Self {
        Self {
            registry: StoreRegistry::new(store.clone()),
            id,
            store,
            config,
            heart: None,
        }
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// The worker's emitter, created on first use
    pub fn heart(&mut self) -> &mut HeartbeatEmitter {
        let (id, store, config) = (&self.id, &self.store, &self.config);
        self.heart
            .get_or_insert_with(|| HeartbeatEmitter::from_config(id.clone(), store.clone(), config))
    }

    /// Register with the cluster, then start beating.
    pub async fn startup(&mut self) -> Result<()> {
        self.registry.register(&self.id).await?;
        self.heart().start();
        Ok(())
    }

    /// Stop beating, then deregister.
    ///
    /// Stopping the heart cannot fail; a deregistration error is returned so
    /// the caller can log it, and a pruner will finish the job later.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.heart().stop().await;
        self.registry.deregister(&self.id).await
    }

    /// Deregister this worker if its heartbeat has gone stale.
    ///
    /// A pruned worker also stops its own heart, otherwise the next beat
    /// would put it back into `workers` without a start time.
    pub async fn prune_if_dead(&mut self) -> Result<bool> {
        let started_at = self
            .store
            .get(&keys::started_key(self.id.as_str()))
            .await?;
        let reconciler = Reconciler::new(
            self.store.clone(),
            Arc::new(self.registry.clone()),
            StalenessPolicy::new(self.config.staleness_threshold()),
        );
        let pruned = reconciler
            .prune_one(&WorkerInfo::new(self.id.clone(), started_at))
            .await?;
        if pruned {
            self.heart().stop().await;
        }
        Ok(pruned)
    }
}
