//! The replicated key-value store gateway (C3).
//!
//! The tracker treats the store as an external collaborator: it provides
//! atomic read-modify-write via a transform closure, continuous change
//! notifications, and replication. This module defines that contract as
//! a trait plus one reference implementation, [`InMemoryStore`], built on
//! a `tokio::sync::RwLock` and a `broadcast` channel standing in for
//! replication fan-out across the cluster.

use crate::tracker::metadata::{JobMetadata, MetadataTransform};
use crate::tracker::types::JobId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::warn;

/// A batch of `(JobId, JobMetadata)` pairs delivered to subscribers for
/// every committed change.
pub type ChangeBatch = Vec<(JobId, JobMetadata)>;

#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn get(&self, job_id: &JobId) -> Option<JobMetadata>;

    async fn put(&self, job_id: JobId, meta: JobMetadata);

    /// Applies `transform` to the entry for `job_id`, fire-and-forget:
    /// eventually applied, notification delivered once committed.
    async fn transform(&self, job_id: JobId, transform: MetadataTransform);

    /// Applies `transform` and returns the resulting snapshot once
    /// committed.
    async fn transform_sync(
        &self,
        job_id: &JobId,
        transform: MetadataTransform,
    ) -> Option<JobMetadata>;

    /// Enumerates every local replica (the job-metadata cache is
    /// replicated to every node, so this is a local read).
    async fn values(&self) -> Vec<JobMetadata>;

    /// Subscribes to batches of changes. A non-blocking callback in a
    /// synchronous API becomes, in async Rust, a receiver the caller
    /// drains on its own task.
    fn subscribe(&self) -> broadcast::Receiver<ChangeBatch>;

    /// Applied atomically with the next transform; used to retire
    /// terminal metadata after `finished_job_info_ttl`.
    async fn set_ttl(&self, job_id: &JobId, ttl: Duration);
}

/// In-memory reference implementation. All operations on a given key are
/// serialized by going through the single write lock, which is a
/// stronger guarantee than the contract requires (only per-key
/// serialization is promised) but is the simplest correct instance.
pub struct InMemoryStore {
    entries: RwLock<HashMap<JobId, JobMetadata>>,
    changes: broadcast::Sender<ChangeBatch>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(1024);
        Self {
            entries: RwLock::new(HashMap::new()),
            changes,
        }
    }

    fn publish(&self, job_id: JobId, meta: JobMetadata) {
        // No active subscribers is a normal state during startup; the
        // send failing just means nobody is listening yet.
        let _ = self.changes.send(vec![(job_id, meta)]);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn get(&self, job_id: &JobId) -> Option<JobMetadata> {
        self.entries.read().await.get(job_id).cloned()
    }

    async fn put(&self, job_id: JobId, meta: JobMetadata) {
        self.entries.write().await.insert(job_id.clone(), meta.clone());
        self.publish(job_id, meta);
    }

    async fn transform(&self, job_id: JobId, transform: MetadataTransform) {
        let _ = self.transform_sync(&job_id, transform).await;
    }

    async fn transform_sync(
        &self,
        job_id: &JobId,
        transform: MetadataTransform,
    ) -> Option<JobMetadata> {
        let mut guard = self.entries.write().await;
        let Some(current) = guard.get(job_id).cloned() else {
            warn!(%job_id, "transform applied to unknown job");
            return None;
        };
        let updated = transform.apply(current);
        guard.insert(job_id.clone(), updated.clone());
        drop(guard);
        self.publish(job_id.clone(), updated.clone());
        Some(updated)
    }

    async fn values(&self) -> Vec<JobMetadata> {
        self.entries.read().await.values().cloned().collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeBatch> {
        self.changes.subscribe()
    }

    async fn set_ttl(&self, job_id: &JobId, ttl: Duration) {
        // Single-process reference store: eviction after `ttl` is
        // advisory only, there is no replication lag to hide it from.
        // A production backend would schedule a deferred tombstone write
        // here instead of dropping the key outright.
        let _ = (job_id, ttl);
    }
}
