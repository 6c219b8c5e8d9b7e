//! Lifecycle controller (C5): the only component that decides what
//! happens next for a job, driven entirely by metadata changes and node
//! events delivered through the dispatcher.
//!
//! Every entry point here runs on the single dispatcher worker task, so
//! within one node there is never a concurrent invocation for the same
//! job. Coordination *across* nodes relies on two separate mechanisms:
//! normal per-split/per-reducer work is inherently partitioned by the
//! plan (each node only ever acts on splits/reducers it owns), while the
//! handful of job-wide actions (the terminal commit/abort, and draining
//! orphaned work after cancellation) are restricted to a single
//! deterministically elected "update leader" so they happen exactly once.

use super::finish::FinishFutureRegistry;
use super::local_state::LocalStateRegistry;
use super::metadata::{JobMetadata, MetadataTransform};
use super::types::{FailCause, JobPhase, NodeId};
use crate::collab::{
    Discovery, NodeEvent, Planner, Shuffle, StoreBackend, TaskCompletionListener, TaskDescriptor,
    TaskExecutor, TaskKind, TaskOutcome,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct LifecycleController {
    node_id: NodeId,
    store: Arc<dyn StoreBackend>,
    executor: Arc<dyn TaskExecutor>,
    external_executor: Arc<dyn TaskExecutor>,
    shuffle: Arc<dyn Shuffle>,
    discovery: Arc<dyn Discovery>,
    #[allow(dead_code)]
    planner: Arc<dyn Planner>,
    local_states: Arc<LocalStateRegistry>,
    finishes: Arc<FinishFutureRegistry>,
}

impl LifecycleController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: NodeId,
        store: Arc<dyn StoreBackend>,
        executor: Arc<dyn TaskExecutor>,
        external_executor: Arc<dyn TaskExecutor>,
        shuffle: Arc<dyn Shuffle>,
        discovery: Arc<dyn Discovery>,
        planner: Arc<dyn Planner>,
        local_states: Arc<LocalStateRegistry>,
        finishes: Arc<FinishFutureRegistry>,
    ) -> Self {
        Self {
            node_id,
            store,
            executor,
            external_executor,
            shuffle,
            discovery,
            planner,
            local_states,
            finishes,
        }
    }

    /// Selects which executor a job's tasks go through: the external
    /// executor when `external_execution` is set, the internal one
    /// otherwise. COMMIT and ABORT never go through this — they always
    /// use the internal executor regardless of the job's mode.
    fn executor_for(&self, meta: &JobMetadata) -> &Arc<dyn TaskExecutor> {
        if meta.external_execution {
            &self.external_executor
        } else {
            &self.executor
        }
    }

    /// Deterministic update-leader election: the lowest-ordered node
    /// among this job's eligible nodes (plan nodes union submitter) that
    /// is currently live. Falls back to the lowest-ordered eligible node
    /// if discovery reports none of them live, so a job is never
    /// orphaned just because discovery has not caught up yet.
    pub async fn is_update_leader(&self, meta: &JobMetadata) -> bool {
        let eligible = meta.eligible_nodes();
        let live = self.discovery.live_nodes().await;
        let candidates: Vec<&NodeId> = eligible.iter().filter(|n| live.contains(n)).collect();
        let leader = candidates
            .into_iter()
            .min()
            .or_else(|| eligible.iter().min());
        leader == Some(&self.node_id)
    }

    pub async fn on_metadata_changed(&self, meta: JobMetadata) {
        match meta.phase {
            JobPhase::Setup => {}
            JobPhase::Map => self.handle_map(&meta).await,
            JobPhase::Reduce => self.handle_reduce(&meta).await,
            JobPhase::Cancelling => self.handle_cancelling(&meta).await,
            JobPhase::Complete => self.handle_complete(&meta).await,
        }
        if meta.external_execution {
            self.external_executor
                .on_job_state_changed(&meta.job_id, &meta)
                .await;
        }
    }

    pub async fn on_node_event(&self, event: NodeEvent) {
        let departed = match event {
            NodeEvent::Left(node) => node,
            NodeEvent::Failed(node) => node,
            NodeEvent::Joined(_) => return,
        };
        info!(%departed, "node departure observed, scanning jobs for affected work");
        for meta in self.store.values().await {
            if meta.phase == JobPhase::Complete || meta.phase == JobPhase::Setup {
                continue;
            }
            let owns_mapper = meta
                .plan
                .splits_for(&departed)
                .iter()
                .any(|s| meta.pending_splits.contains(s));
            let owns_reducer = meta
                .plan
                .reducers_for(&departed)
                .iter()
                .any(|r| meta.pending_reducers.contains(r));
            if owns_mapper || owns_reducer {
                warn!(job_id = %meta.job_id, %departed, "cancelling job: owning node departed");
                self.store
                    .transform(
                        meta.job_id.clone(),
                        MetadataTransform::CancelJob {
                            splits: Default::default(),
                            reducers: Default::default(),
                            err: Some(FailCause::node_loss(format!("node {departed} departed"))),
                        },
                    )
                    .await;
            }
        }
    }

    async fn handle_map(&self, meta: &JobMetadata) {
        let my_splits = meta.plan.splits_for(&self.node_id);
        if my_splits.is_empty() {
            return;
        }
        let local = self.local_states.get_or_create(meta.job_id.clone()).await;
        local.set_expected_mappers_once(my_splits.len());
        let executor = self.executor_for(meta);
        for split in my_splits {
            if !meta.pending_splits.contains(split) {
                continue;
            }
            if !local.add_mapper(split.clone()) {
                continue;
            }
            let task = TaskDescriptor {
                job_id: meta.job_id.clone(),
                node: self.node_id.clone(),
                kind: TaskKind::Map(split.clone()),
                task_number: meta.task_number_for_split(split),
            };
            debug!(job_id = %meta.job_id, split = %split, "dispatching map task");
            executor.submit(task, Arc::new(self.clone_listener())).await;
        }
        if !meta.external_execution {
            return;
        }
        // External execution launches one worker process per node per
        // job, running map and reduce together, so this node's reducer
        // tasks ride along in the same dispatch pass as its mappers
        // rather than waiting for the REDUCE phase.
        for &index in meta.plan.reducers_for(&self.node_id) {
            if !meta.pending_reducers.contains(&index) {
                continue;
            }
            if !local.add_reducer(index) {
                continue;
            }
            let task = TaskDescriptor {
                job_id: meta.job_id.clone(),
                node: self.node_id.clone(),
                kind: TaskKind::Reduce(index),
                task_number: index as u32,
            };
            debug!(job_id = %meta.job_id, reducer = index, "coupling reduce task into external map dispatch");
            executor.submit(task, Arc::new(self.clone_listener())).await;
        }
    }

    async fn handle_reduce(&self, meta: &JobMetadata) {
        let local = self.local_states.get_or_create(meta.job_id.clone()).await;
        if !meta.external_execution {
            // External jobs already had their reducer tasks scheduled
            // alongside the mappers in `handle_map`; only internal
            // execution schedules reducers here.
            for &index in meta.plan.reducers_for(&self.node_id) {
                if !meta.pending_reducers.contains(&index) {
                    continue;
                }
                if !local.add_reducer(index) {
                    continue;
                }
                let task = TaskDescriptor {
                    job_id: meta.job_id.clone(),
                    node: self.node_id.clone(),
                    kind: TaskKind::Reduce(index),
                    task_number: index as u32,
                };
                debug!(job_id = %meta.job_id, reducer = index, "dispatching reduce task");
                self.executor
                    .submit(task, Arc::new(self.clone_listener()))
                    .await;
            }
        }
        if meta.pending_reducers.is_empty()
            && meta.fail_cause.is_none()
            && self.is_update_leader(meta).await
            && local.mark_terminal_submitted()
        {
            info!(job_id = %meta.job_id, "submitting commit task as update leader");
            let task = TaskDescriptor {
                job_id: meta.job_id.clone(),
                node: self.node_id.clone(),
                kind: TaskKind::Commit,
                task_number: 0,
            };
            // COMMIT always runs on the internal executor, even for
            // external-execution jobs.
            self.executor
                .submit(task, Arc::new(self.clone_listener()))
                .await;
        }
    }

    async fn handle_cancelling(&self, meta: &JobMetadata) {
        if let Some(local) = self.local_states.get(&meta.job_id).await {
            if local.on_cancel() {
                self.executor_for(meta).cancel(&meta.job_id).await;
            }
        }
        if !self.is_update_leader(meta).await {
            return;
        }
        let local = self.local_states.get_or_create(meta.job_id.clone()).await;
        if !local.mark_terminal_submitted() {
            return;
        }
        if meta.pending_splits.is_empty() && meta.pending_reducers.is_empty() {
            info!(job_id = %meta.job_id, "submitting abort task as update leader");
            let task = TaskDescriptor {
                job_id: meta.job_id.clone(),
                node: self.node_id.clone(),
                kind: TaskKind::Abort,
                task_number: 0,
            };
            // ABORT always runs on the internal executor, even for
            // external-execution jobs.
            self.executor
                .submit(task, Arc::new(self.clone_listener()))
                .await;
            return;
        }
        info!(job_id = %meta.job_id, "draining orphaned work as update leader to finish cancellation");
        self.store
            .transform(
                meta.job_id.clone(),
                MetadataTransform::CancelJob {
                    splits: meta.pending_splits.clone(),
                    reducers: meta.pending_reducers.clone(),
                    err: None,
                },
            )
            .await;
    }

    async fn handle_complete(&self, meta: &JobMetadata) {
        let result = match &meta.fail_cause {
            Some(cause) => Err(cause.clone()),
            None => Ok(meta.job_id.clone()),
        };
        self.finishes.complete(&meta.job_id, result).await;
        self.local_states.remove(&meta.job_id).await;
        self.shuffle.job_finished(&meta.job_id).await;
        self.store
            .set_ttl(&meta.job_id, meta.job_info.finished_job_info_ttl())
            .await;
    }

    fn clone_listener(&self) -> CompletionForwarder {
        CompletionForwarder {
            node_id: self.node_id.clone(),
            store: self.store.clone(),
            executor: self.executor.clone(),
            shuffle: self.shuffle.clone(),
            local_states: self.local_states.clone(),
        }
    }
}

/// Thin [`TaskCompletionListener`] passed to the executor for every task
/// this controller dispatches. It forwards straight into
/// [`super::completion::TaskCompletionHandler`], so the branch logic for
/// map/combine/reduce/commit completions lives in exactly one place.
#[derive(Clone)]
struct CompletionForwarder {
    node_id: NodeId,
    store: Arc<dyn StoreBackend>,
    executor: Arc<dyn TaskExecutor>,
    shuffle: Arc<dyn Shuffle>,
    local_states: Arc<LocalStateRegistry>,
}

#[async_trait]
impl TaskCompletionListener for CompletionForwarder {
    async fn on_task_finished(&self, task: TaskDescriptor, outcome: TaskOutcome) {
        let handler = super::completion::TaskCompletionHandler::new(
            self.node_id.clone(),
            self.store.clone(),
            self.executor.clone(),
            self.shuffle.clone(),
            self.local_states.clone(),
        );
        handler.on_task_finished(task, outcome).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{ExternalExecutor, InMemoryStore, InProcessExecutor, LocalShuffle, RoundRobinPlanner, StaticDiscovery};
    use crate::tracker::metadata::JobMetadata;
    use crate::tracker::types::{FailCause, InputSplit, JobId, JobInfo, MapReducePlan};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn controller(store: Arc<dyn StoreBackend>) -> (LifecycleController, Arc<LocalStateRegistry>) {
        let local_states = Arc::new(LocalStateRegistry::new());
        let controller = LifecycleController::new(
            NodeId::from("n1"),
            store,
            Arc::new(InProcessExecutor::new()),
            Arc::new(ExternalExecutor::new()),
            Arc::new(LocalShuffle::new()),
            Arc::new(StaticDiscovery::new([NodeId::from("n1")])),
            Arc::new(RoundRobinPlanner::new()),
            local_states.clone(),
            Arc::new(FinishFutureRegistry::new()),
        );
        (controller, local_states)
    }

    fn job_id() -> JobId {
        JobId {
            cluster_tag: "c".into(),
            sequence: 1,
        }
    }

    async fn poll_until_complete(store: &Arc<dyn StoreBackend>, job_id: &JobId) -> JobMetadata {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let meta = store.get(job_id).await.unwrap();
                if meta.phase == JobPhase::Complete {
                    return meta;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job should reach COMPLETE within timeout")
    }

    #[tokio::test]
    async fn external_execution_couples_reducer_dispatch_into_the_map_pass() {
        let store: Arc<dyn StoreBackend> = Arc::new(InMemoryStore::new());
        let (controller, local_states) = controller(store.clone());

        let mut mappers = BTreeMap::new();
        mappers.insert(NodeId::from("n1"), vec![InputSplit::new("s1")]);
        let mut reducers = BTreeMap::new();
        reducers.insert(NodeId::from("n1"), vec![0]);
        let plan = MapReducePlan::new(mappers, reducers, 1).unwrap();
        let meta = JobMetadata {
            job_id: job_id(),
            job_info: JobInfo::new(vec!["a".into()], "out", 1)
                .with_config("external_execution", "true"),
            plan,
            phase: JobPhase::Map,
            pending_splits: [InputSplit::new("s1")].into_iter().collect(),
            pending_reducers: [0].into_iter().collect(),
            external_execution: true,
            fail_cause: None,
            submitted_by: NodeId::from("n1"),
        };
        store.put(job_id(), meta.clone()).await;

        controller.on_metadata_changed(meta).await;

        let local = local_states.get(&job_id()).await.unwrap();
        assert!(local.mapper_scheduled(&InputSplit::new("s1")));
        assert!(
            local.reducer_scheduled(0),
            "external execution must schedule this node's reducer alongside its mappers"
        );
    }

    #[tokio::test]
    async fn cancelling_with_empty_pending_sets_submits_abort_and_reaches_complete() {
        let store: Arc<dyn StoreBackend> = Arc::new(InMemoryStore::new());
        let (controller, _local_states) = controller(store.clone());

        let mut mappers = BTreeMap::new();
        mappers.insert(NodeId::from("n1"), vec![InputSplit::new("s1")]);
        let mut reducers = BTreeMap::new();
        reducers.insert(NodeId::from("n1"), vec![0]);
        let plan = MapReducePlan::new(mappers, reducers, 1).unwrap();
        let meta = JobMetadata {
            job_id: job_id(),
            job_info: JobInfo::new(vec!["a".into()], "out", 1),
            plan,
            phase: JobPhase::Cancelling,
            pending_splits: Default::default(),
            pending_reducers: Default::default(),
            external_execution: false,
            fail_cause: Some(FailCause::task_failure("reduce task failed")),
            submitted_by: NodeId::from("n1"),
        };
        store.put(job_id(), meta.clone()).await;

        controller.on_metadata_changed(meta).await;

        let finished = poll_until_complete(&store, &job_id()).await;
        assert_eq!(finished.phase, JobPhase::Complete);
        assert!(finished.fail_cause.is_some());
    }
}
