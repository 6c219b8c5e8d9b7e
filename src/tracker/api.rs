//! Submission and status API (C6): the tracker's public surface.
//!
//! `submit` and `status` are the only entry points most callers need;
//! everything else in this crate exists to make their guarantees hold.
//! Both are gated by the busy gate so neither can start — or silently
//! race — a shutdown already in progress.

use super::finish::{FinishFutureRegistry, JobHandle};
use super::local_state::LocalStateRegistry;
use super::metadata::JobMetadata;
use super::shutdown::BusyGate;
use super::types::{JobId, JobIdGenerator, JobInfo, JobPhase, MapReducePlan, NodeId};
use crate::collab::{Discovery, JobFactory, Planner, StoreBackend};
use crate::error::{Result, TrackerError};
use std::sync::Arc;
use tracing::info;

/// Facade wiring the replicated store, planner, job factory, discovery,
/// and bookkeeping registries behind `submit`/`status`/`plan`/`job`.
pub struct JobTracker {
    node_id: NodeId,
    store: Arc<dyn StoreBackend>,
    discovery: Arc<dyn Discovery>,
    planner: Arc<dyn Planner>,
    job_factory: Arc<dyn JobFactory>,
    ids: JobIdGenerator,
    gate: Arc<BusyGate>,
    finishes: Arc<FinishFutureRegistry>,
    #[allow(dead_code)]
    local_states: Arc<LocalStateRegistry>,
}

impl JobTracker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: NodeId,
        cluster_tag: impl Into<String>,
        store: Arc<dyn StoreBackend>,
        discovery: Arc<dyn Discovery>,
        planner: Arc<dyn Planner>,
        job_factory: Arc<dyn JobFactory>,
        gate: Arc<BusyGate>,
        finishes: Arc<FinishFutureRegistry>,
        local_states: Arc<LocalStateRegistry>,
    ) -> Self {
        Self {
            node_id,
            store,
            discovery,
            planner,
            job_factory,
            ids: JobIdGenerator::new(cluster_tag),
            gate,
            finishes,
            local_states,
        }
    }

    /// Resolves the job, plans it, writes its initial metadata, and
    /// registers a completion handle — returning a [`JobHandle`] the
    /// caller can await for the final result. Rejects the call outright
    /// once shutdown has begun.
    pub async fn submit(&self, info: JobInfo) -> Result<(JobId, JobHandle)> {
        let _hold = self.gate.try_read()?;

        self.job_factory
            .create(&info)
            .await
            .map_err(TrackerError::InvalidConfig)?;

        let live_nodes: Vec<NodeId> = self.discovery.live_nodes().await.into_iter().collect();
        let plan = self
            .planner
            .plan(&info, &live_nodes)
            .await
            .map_err(TrackerError::InvalidPlan)?;

        let job_id = self.ids.next_id();
        let handle = self
            .finishes
            .register_new(job_id.clone())
            .await
            .ok_or_else(|| TrackerError::DuplicateJob(job_id.clone()))?;

        let external_execution = info.external_execution();
        let meta = JobMetadata {
            job_id: job_id.clone(),
            job_info: info,
            plan,
            phase: JobPhase::Map,
            pending_splits: Default::default(),
            pending_reducers: Default::default(),
            external_execution,
            fail_cause: None,
            submitted_by: self.node_id.clone(),
        };
        let meta = seed_pending(meta);
        info!(%job_id, "job submitted");
        self.store.put(job_id.clone(), meta).await;

        Ok((job_id, JobHandle(handle)))
    }

    /// Returns or creates the completion handle for `job_id`. A store
    /// lookup that comes back empty — whether the job id was never
    /// submitted or its metadata already expired after completion — is
    /// treated as not found rather than synthesizing a handle for it.
    pub async fn status(&self, job_id: &JobId) -> Result<JobHandle> {
        let _hold = self.gate.try_read()?;
        if self.store.get(job_id).await.is_none() {
            return Err(TrackerError::JobNotFound(job_id.clone()));
        }
        Ok(JobHandle(self.finishes.get_or_create(job_id.clone()).await))
    }

    /// Returns the current plan for `job_id`, if the job is still known
    /// to the store.
    pub async fn plan(&self, job_id: &JobId) -> Result<MapReducePlan> {
        let _hold = self.gate.try_read()?;
        self.store
            .get(job_id)
            .await
            .map(|meta| meta.plan)
            .ok_or_else(|| TrackerError::JobNotFound(job_id.clone()))
    }

    /// Returns the current metadata snapshot for `job_id`.
    pub async fn job(&self, job_id: &JobId) -> Result<JobMetadata> {
        let _hold = self.gate.try_read()?;
        self.store
            .get(job_id)
            .await
            .ok_or_else(|| TrackerError::JobNotFound(job_id.clone()))
    }
}

fn seed_pending(mut meta: JobMetadata) -> JobMetadata {
    meta.pending_splits = meta.plan.all_splits();
    meta.pending_reducers = (0..meta.plan.reducer_count()).collect();
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{DefaultJobFactory, InMemoryStore, RoundRobinPlanner, StaticDiscovery};

    fn tracker() -> JobTracker {
        JobTracker::new(
            NodeId::from("n1"),
            "cluster",
            Arc::new(InMemoryStore::new()),
            Arc::new(StaticDiscovery::new([NodeId::from("n1")])),
            Arc::new(RoundRobinPlanner::new()),
            Arc::new(DefaultJobFactory::new()),
            Arc::new(BusyGate::new()),
            Arc::new(FinishFutureRegistry::new()),
            Arc::new(LocalStateRegistry::new()),
        )
    }

    #[tokio::test]
    async fn submit_rejects_job_with_unregistered_factory_name() {
        let tracker = tracker();
        let info = JobInfo::new(vec!["in".into()], "out", 1).with_config("job_name", "missing");
        assert!(matches!(
            tracker.submit(info).await,
            Err(TrackerError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn status_of_unknown_job_is_not_found() {
        let tracker = tracker();
        let job_id = JobId {
            cluster_tag: "c".into(),
            sequence: 999,
        };
        assert!(matches!(
            tracker.status(&job_id).await,
            Err(TrackerError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn submit_then_status_returns_a_handle_for_the_same_job() {
        let tracker = tracker();
        let info = JobInfo::new(vec!["a".into()], "out", 0);
        let (job_id, _handle) = tracker.submit(info).await.unwrap();
        assert!(tracker.status(&job_id).await.is_ok());
    }

    #[tokio::test]
    async fn submit_fails_fast_once_gate_is_closed() {
        let tracker = tracker();
        let _write = tracker.gate.close().await;
        let info = JobInfo::new(vec!["a".into()], "out", 0);
        assert!(matches!(
            tracker.submit(info).await,
            Err(TrackerError::ShuttingDown)
        ));
    }
}
