//! Task execution collaborator (part of C8's upstream dependencies).
//!
//! The tracker never runs map/reduce/combine work itself; it hands a
//! [`TaskDescriptor`] to a [`TaskExecutor`] and is notified of the outcome
//! through a [`TaskCompletionListener`]. [`InProcessExecutor`] is a
//! reference implementation that runs tasks as local tokio tasks and is
//! suitable for single-process integration tests.

use crate::tracker::metadata::JobMetadata;
use crate::tracker::types::{FailCause, InputSplit, JobId, NodeId};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which kind of work a dispatched task performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    Map(InputSplit),
    Combine,
    Reduce(usize),
    Commit,
    Abort,
}

/// Everything the executor needs to run one task.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub job_id: JobId,
    pub node: NodeId,
    pub kind: TaskKind,
    /// Deterministic attempt number, from `MapReducePlan::task_number` or
    /// `combine_task_number`; used by executors that key retries or
    /// output file names off of it.
    pub task_number: u32,
}

/// Outcome reported back through a [`TaskCompletionListener`].
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Success,
    Failure(FailCause),
}

/// Callback the task executor invokes once a dispatched task finishes.
/// Implemented by the completion handler (C8); kept as its own trait so
/// executor implementations do not need to depend on the lifecycle
/// machinery directly.
#[async_trait]
pub trait TaskCompletionListener: Send + Sync {
    async fn on_task_finished(&self, task: TaskDescriptor, outcome: TaskOutcome);
}

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Starts `task` asynchronously; the result reaches the tracker later
    /// through `listener`. Must not block past scheduling the work.
    async fn submit(&self, task: TaskDescriptor, listener: Arc<dyn TaskCompletionListener>);

    /// Best-effort cancellation signal for a task already submitted for
    /// `job_id` on this node. A no-op if the task already finished.
    async fn cancel(&self, job_id: &JobId);

    /// Informational hook: called whenever a job with `external_execution`
    /// set observes a metadata change, so an out-of-process worker can
    /// stay in sync with tracker-side phase transitions without running
    /// its own store subscription. Never called for jobs that run
    /// in-process.
    async fn on_job_state_changed(&self, job_id: &JobId, meta: &JobMetadata);
}

/// Runs every task as a local tokio task that always succeeds. Intended
/// for wiring tests and examples, not production use: real map/reduce
/// work belongs to an out-of-process worker pool.
#[derive(Default)]
pub struct InProcessExecutor;

impl InProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskExecutor for InProcessExecutor {
    async fn submit(&self, task: TaskDescriptor, listener: Arc<dyn TaskCompletionListener>) {
        debug!(job_id = %task.job_id, kind = ?task.kind, "submitting task to in-process executor");
        tokio::spawn(async move {
            listener.on_task_finished(task, TaskOutcome::Success).await;
        });
    }

    async fn cancel(&self, job_id: &JobId) {
        warn!(%job_id, "in-process executor received cancel; tasks run to completion regardless");
    }

    async fn on_job_state_changed(&self, _job_id: &JobId, _meta: &JobMetadata) {
        // In-process jobs are never externally executed, so the lifecycle
        // controller never calls this for tasks this executor runs.
    }
}

/// Reference stand-in for an out-of-process executor: an external worker
/// launched once per node per job that runs the coupled map+reduce batch
/// handed to it and reports completion the same way the in-process
/// executor does. There is no real external process in this crate, so
/// this differs from [`InProcessExecutor`] only in implementing
/// `on_job_state_changed`, giving `external_execution` jobs a concrete
/// executor to observe the hook against.
#[derive(Default)]
pub struct ExternalExecutor;

impl ExternalExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskExecutor for ExternalExecutor {
    async fn submit(&self, task: TaskDescriptor, listener: Arc<dyn TaskCompletionListener>) {
        debug!(job_id = %task.job_id, kind = ?task.kind, "submitting task to external executor");
        tokio::spawn(async move {
            listener.on_task_finished(task, TaskOutcome::Success).await;
        });
    }

    async fn cancel(&self, job_id: &JobId) {
        warn!(%job_id, "external executor received cancel; tasks run to completion regardless");
    }

    async fn on_job_state_changed(&self, job_id: &JobId, meta: &JobMetadata) {
        debug!(job_id = %job_id, phase = ?meta.phase, "external executor notified of job state change");
    }
}
