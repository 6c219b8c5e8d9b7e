//! Task completion handler (C8).
//!
//! Receives every task outcome the executor reports and turns it into
//! exactly one transform applied to the job's replicated metadata. The
//! branch taken depends on both the task kind and, for map completions,
//! whether this was the node's last outstanding mapper and whether the
//! job runs a combiner:
//!
//! - last mapper, combiner configured, internal execution: submit the
//!   combine task locally, do not touch `pending_splits` yet — the
//!   combine completion stands in for every one of this node's mappers
//!   at once. A combiner is never scheduled locally for
//!   `external_execution` jobs; the external process owns combining.
//! - last mapper, no combiner: flush shuffle for this node, then remove
//!   just the split that finished.
//! - not the last mapper: remove just the split that finished,
//!   immediately, without touching shuffle.
//! - combine finished: flush shuffle for this node, then remove every
//!   split this node ever claimed, carrying forward whichever of the
//!   flush error or the task error happened (flush error takes
//!   precedence since it is discovered second).

use super::local_state::LocalStateRegistry;
use super::metadata::MetadataTransform;
use super::types::NodeId;
use crate::collab::{Shuffle, StoreBackend, TaskCompletionListener, TaskDescriptor, TaskExecutor, TaskKind, TaskOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

pub struct TaskCompletionHandler {
    node_id: NodeId,
    store: Arc<dyn StoreBackend>,
    executor: Arc<dyn TaskExecutor>,
    shuffle: Arc<dyn Shuffle>,
    local_states: Arc<LocalStateRegistry>,
}

impl TaskCompletionHandler {
    pub fn new(
        node_id: NodeId,
        store: Arc<dyn StoreBackend>,
        executor: Arc<dyn TaskExecutor>,
        shuffle: Arc<dyn Shuffle>,
        local_states: Arc<LocalStateRegistry>,
    ) -> Self {
        Self {
            node_id,
            store,
            executor,
            shuffle,
            local_states,
        }
    }

    async fn handle_map(&self, task: &TaskDescriptor, split: &super::types::InputSplit, outcome: TaskOutcome) {
        let task_err = match outcome {
            TaskOutcome::Success => None,
            TaskOutcome::Failure(cause) => Some(cause),
        };
        let Some(local) = self.local_states.get(&task.job_id).await else {
            error!(job_id = %task.job_id, "map completion for job with no local state");
            return;
        };
        let completed = local.increment_completed_mappers();
        if !local.is_last_mapper(completed) {
            self.store
                .transform(
                    task.job_id.clone(),
                    MetadataTransform::RemoveMappers {
                        splits: [split.clone()].into_iter().collect(),
                        err: task_err,
                    },
                )
                .await;
            return;
        }

        let Some(meta) = self.store.get(&task.job_id).await else {
            error!(job_id = %task.job_id, "last-mapper completion for unknown job");
            return;
        };
        if meta.job_info.has_combiner() && !meta.external_execution && task_err.is_none() {
            if local.mark_combine_submitted() {
                debug!(job_id = %task.job_id, "last mapper done, submitting combine task");
                let combine_task = TaskDescriptor {
                    job_id: task.job_id.clone(),
                    node: self.node_id.clone(),
                    kind: TaskKind::Combine,
                    task_number: meta.task_number_for_node(&self.node_id),
                };
                self.executor
                    .submit(combine_task, Arc::new(self.as_listener()))
                    .await;
            }
            return;
        }

        let flush_err = self.shuffle.flush(&task.job_id, &self.node_id).await.err();
        self.store
            .transform(
                task.job_id.clone(),
                MetadataTransform::RemoveMappers {
                    splits: [split.clone()].into_iter().collect(),
                    err: flush_err.or(task_err),
                },
            )
            .await;
    }

    async fn handle_combine(&self, task: &TaskDescriptor, outcome: TaskOutcome) {
        let task_err = match outcome {
            TaskOutcome::Success => None,
            TaskOutcome::Failure(cause) => Some(cause),
        };
        let Some(local) = self.local_states.get(&task.job_id).await else {
            error!(job_id = %task.job_id, "combine completion for job with no local state");
            return;
        };
        let flush_err = if task_err.is_none() {
            self.shuffle.flush(&task.job_id, &self.node_id).await.err()
        } else {
            None
        };
        let splits = local.curr_mappers_snapshot().into_iter().collect();
        self.store
            .transform(
                task.job_id.clone(),
                MetadataTransform::RemoveMappers {
                    splits,
                    err: flush_err.or(task_err),
                },
            )
            .await;
    }

    async fn handle_reduce(&self, task: &TaskDescriptor, index: usize, outcome: TaskOutcome) {
        let err = match outcome {
            TaskOutcome::Success => None,
            TaskOutcome::Failure(cause) => Some(cause),
        };
        self.store
            .transform(
                task.job_id.clone(),
                MetadataTransform::RemoveReducer { index, err },
            )
            .await;
    }

    async fn handle_commit(&self, task: &TaskDescriptor, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Success => {
                debug!(job_id = %task.job_id, "commit task succeeded");
                self.store
                    .transform(
                        task.job_id.clone(),
                        MetadataTransform::UpdatePhase(super::types::JobPhase::Complete),
                    )
                    .await;
            }
            TaskOutcome::Failure(cause) => {
                error!(job_id = %task.job_id, error = %cause, "commit task failed");
                self.store
                    .transform(
                        task.job_id.clone(),
                        MetadataTransform::CancelJob {
                            splits: Default::default(),
                            reducers: Default::default(),
                            err: Some(cause),
                        },
                    )
                    .await;
            }
        }
    }

    async fn handle_abort(&self, task: &TaskDescriptor, outcome: TaskOutcome) {
        if let TaskOutcome::Failure(cause) = outcome {
            error!(job_id = %task.job_id, error = %cause, "abort task itself failed, job still retires as cancelled");
        }
        self.store
            .transform(
                task.job_id.clone(),
                MetadataTransform::CancelJob {
                    splits: Default::default(),
                    reducers: Default::default(),
                    err: None,
                },
            )
            .await;
    }

    fn as_listener(&self) -> Self {
        Self {
            node_id: self.node_id.clone(),
            store: self.store.clone(),
            executor: self.executor.clone(),
            shuffle: self.shuffle.clone(),
            local_states: self.local_states.clone(),
        }
    }
}

#[async_trait]
impl TaskCompletionListener for TaskCompletionHandler {
    async fn on_task_finished(&self, task: TaskDescriptor, outcome: TaskOutcome) {
        match &task.kind {
            TaskKind::Map(split) => {
                let split = split.clone();
                self.handle_map(&task, &split, outcome).await;
            }
            TaskKind::Combine => self.handle_combine(&task, outcome).await,
            TaskKind::Reduce(index) => {
                let index = *index;
                self.handle_reduce(&task, index, outcome).await;
            }
            TaskKind::Commit => self.handle_commit(&task, outcome).await,
            TaskKind::Abort => self.handle_abort(&task, outcome).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{InMemoryStore, InProcessExecutor, LocalShuffle};
    use crate::tracker::local_state::LocalJobState;
    use crate::tracker::types::{FailCause, InputSplit, JobId, JobInfo, JobPhase, MapReducePlan};
    use std::collections::BTreeMap;

    fn handler() -> (TaskCompletionHandler, Arc<dyn StoreBackend>, Arc<LocalStateRegistry>) {
        let store: Arc<dyn StoreBackend> = Arc::new(InMemoryStore::new());
        let local_states = Arc::new(LocalStateRegistry::new());
        let handler = TaskCompletionHandler::new(
            NodeId::from("n1"),
            store.clone(),
            Arc::new(InProcessExecutor::new()),
            Arc::new(LocalShuffle::new()),
            local_states.clone(),
        );
        (handler, store, local_states)
    }

    async fn seed_job(store: &Arc<dyn StoreBackend>, job_id: JobId, combiner: bool) {
        let mut mappers = BTreeMap::new();
        mappers.insert(
            NodeId::from("n1"),
            vec![InputSplit::new("s1"), InputSplit::new("s2")],
        );
        let plan = MapReducePlan::new(mappers, BTreeMap::new(), 0).unwrap();
        let mut job_info = JobInfo::new(vec!["in".into()], "out", 0);
        if combiner {
            job_info = job_info.with_config("combiner", "true");
        }
        store
            .put(
                job_id.clone(),
                crate::tracker::metadata::JobMetadata {
                    job_id: job_id.clone(),
                    job_info,
                    plan,
                    phase: JobPhase::Map,
                    pending_splits: [InputSplit::new("s1"), InputSplit::new("s2")]
                        .into_iter()
                        .collect(),
                    pending_reducers: Default::default(),
                    external_execution: false,
                    fail_cause: None,
                    submitted_by: NodeId::from("n1"),
                },
            )
            .await;
    }

    #[tokio::test]
    async fn non_last_mapper_removes_only_its_split_immediately() {
        let (handler, store, local_states) = handler();
        let job_id = JobId {
            cluster_tag: "c".into(),
            sequence: 1,
        };
        seed_job(&store, job_id.clone(), false).await;
        let local = local_states.get_or_create(job_id.clone()).await;
        local.set_expected_mappers_once(2);
        local.add_mapper(InputSplit::new("s1"));
        local.add_mapper(InputSplit::new("s2"));

        let task = TaskDescriptor {
            job_id: job_id.clone(),
            node: NodeId::from("n1"),
            kind: TaskKind::Map(InputSplit::new("s1")),
            task_number: 0,
        };
        handler.on_task_finished(task, TaskOutcome::Success).await;

        let meta = store.get(&job_id).await.unwrap();
        assert!(!meta.pending_splits.contains(&InputSplit::new("s1")));
        assert!(meta.pending_splits.contains(&InputSplit::new("s2")));
    }

    #[tokio::test]
    async fn last_mapper_without_combiner_flushes_then_removes_its_split() {
        let (handler, store, local_states) = handler();
        let job_id = JobId {
            cluster_tag: "c".into(),
            sequence: 2,
        };
        seed_job(&store, job_id.clone(), false).await;
        let local = local_states.get_or_create(job_id.clone()).await;
        local.set_expected_mappers_once(1);
        local.add_mapper(InputSplit::new("s1"));

        let task = TaskDescriptor {
            job_id: job_id.clone(),
            node: NodeId::from("n1"),
            kind: TaskKind::Map(InputSplit::new("s1")),
            task_number: 0,
        };
        handler.on_task_finished(task, TaskOutcome::Success).await;

        let meta = store.get(&job_id).await.unwrap();
        assert!(!meta.pending_splits.contains(&InputSplit::new("s1")));
    }

    #[tokio::test]
    async fn last_mapper_with_combiner_does_not_touch_pending_splits() {
        let (handler, store, local_states) = handler();
        let job_id = JobId {
            cluster_tag: "c".into(),
            sequence: 3,
        };
        seed_job(&store, job_id.clone(), true).await;
        let local = local_states.get_or_create(job_id.clone()).await;
        local.set_expected_mappers_once(1);
        local.add_mapper(InputSplit::new("s1"));

        let task = TaskDescriptor {
            job_id: job_id.clone(),
            node: NodeId::from("n1"),
            kind: TaskKind::Map(InputSplit::new("s1")),
            task_number: 0,
        };
        handler.on_task_finished(task, TaskOutcome::Success).await;

        let meta = store.get(&job_id).await.unwrap();
        assert!(meta.pending_splits.contains(&InputSplit::new("s1")));
        assert!(meta.pending_splits.contains(&InputSplit::new("s2")));
    }

    #[tokio::test]
    async fn combine_completion_removes_every_claimed_split_at_once() {
        let (handler, store, local_states) = handler();
        let job_id = JobId {
            cluster_tag: "c".into(),
            sequence: 4,
        };
        seed_job(&store, job_id.clone(), true).await;
        let local: Arc<LocalJobState> = local_states.get_or_create(job_id.clone()).await;
        local.add_mapper(InputSplit::new("s1"));
        local.add_mapper(InputSplit::new("s2"));

        let task = TaskDescriptor {
            job_id: job_id.clone(),
            node: NodeId::from("n1"),
            kind: TaskKind::Combine,
            task_number: 0,
        };
        handler.on_task_finished(task, TaskOutcome::Success).await;

        let meta = store.get(&job_id).await.unwrap();
        assert!(meta.pending_splits.is_empty());
    }

    #[tokio::test]
    async fn commit_failure_cancels_the_job_with_its_cause() {
        let (handler, store, _local_states) = handler();
        let job_id = JobId {
            cluster_tag: "c".into(),
            sequence: 5,
        };
        seed_job(&store, job_id.clone(), false).await;
        store
            .transform(
                job_id.clone(),
                MetadataTransform::RemoveMappers {
                    splits: [InputSplit::new("s1"), InputSplit::new("s2")]
                        .into_iter()
                        .collect(),
                    err: None,
                },
            )
            .await;

        let task = TaskDescriptor {
            job_id: job_id.clone(),
            node: NodeId::from("n1"),
            kind: TaskKind::Commit,
            task_number: 0,
        };
        handler
            .on_task_finished(task, TaskOutcome::Failure(FailCause::task_failure("boom")))
            .await;

        let meta = store.get(&job_id).await.unwrap();
        assert_eq!(meta.phase, JobPhase::Complete);
        assert!(meta.fail_cause.is_some());
    }
}
