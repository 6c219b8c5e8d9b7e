//! `JobMetadata`, the replicated entity, and the transform closures that
//! evolve it.
//!
//! A transform is a pure function `JobMetadata -> JobMetadata` applied by
//! the store under an exclusive lock on the entry (see
//! [`crate::collab::store`]). Closures never read outside their input and
//! are total: they never panic on well-formed metadata.

use super::types::{FailCause, InputSplit, JobId, JobInfo, JobPhase, MapReducePlan, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The replicated job-tracking entity. Snapshots are value-typed: a
/// transform produces a new snapshot, readers never observe a partially
/// mutated one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_id: JobId,
    pub job_info: JobInfo,
    pub plan: MapReducePlan,
    pub phase: JobPhase,
    pub pending_splits: BTreeSet<InputSplit>,
    pub pending_reducers: BTreeSet<usize>,
    pub external_execution: bool,
    pub fail_cause: Option<FailCause>,
    /// Node that called `submit()`; counts as topologically eligible for
    /// the update-leader election even if the plan never assigns it work.
    pub submitted_by: NodeId,
}

impl JobMetadata {
    pub fn task_number_for_split(&self, split: &InputSplit) -> u32 {
        self.plan.task_number(split)
    }

    pub fn task_number_for_node(&self, node: &NodeId) -> u32 {
        self.plan.combine_task_number(node)
    }

    /// Nodes eligible to host the update-leader election for this job:
    /// the plan's node set union the submitter.
    pub fn eligible_nodes(&self) -> BTreeSet<NodeId> {
        let mut nodes = self.plan.nodes();
        nodes.insert(self.submitted_by.clone());
        nodes
    }
}

/// A pure, serialisable transform over `JobMetadata`. Tagged-variant
/// representation so a transform can cross a network boundary to a
/// distributed store unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MetadataTransform {
    UpdatePhase(JobPhase),
    RemoveMappers {
        splits: BTreeSet<InputSplit>,
        err: Option<FailCause>,
    },
    RemoveReducer {
        index: usize,
        err: Option<FailCause>,
    },
    CancelJob {
        splits: BTreeSet<InputSplit>,
        reducers: BTreeSet<usize>,
        err: Option<FailCause>,
    },
}

impl MetadataTransform {
    /// Applies this transform, producing a new snapshot. Once `fail_cause`
    /// is set it is never cleared and never overwritten: the first
    /// failure recorded for a job wins, which keeps repeated application
    /// of the same transform idempotent.
    pub fn apply(&self, mut meta: JobMetadata) -> JobMetadata {
        match self {
            MetadataTransform::UpdatePhase(phase) => {
                meta.phase = *phase;
            }
            MetadataTransform::RemoveMappers { splits, err } => {
                for s in splits {
                    meta.pending_splits.remove(s);
                }
                if let Some(cause) = err {
                    Self::record_failure(&mut meta, cause.clone());
                } else if meta.pending_splits.is_empty() && meta.phase != JobPhase::Cancelling {
                    meta.phase = JobPhase::Reduce;
                }
            }
            MetadataTransform::RemoveReducer { index, err } => {
                meta.pending_reducers.remove(index);
                if let Some(cause) = err {
                    Self::record_failure(&mut meta, cause.clone());
                }
            }
            MetadataTransform::CancelJob {
                splits,
                reducers,
                err,
            } => {
                for s in splits {
                    meta.pending_splits.remove(s);
                }
                for r in reducers {
                    meta.pending_reducers.remove(r);
                }
                if meta.phase != JobPhase::Complete {
                    meta.phase = JobPhase::Cancelling;
                }
                if let Some(cause) = err {
                    Self::record_failure(&mut meta, cause.clone());
                }
                if meta.pending_splits.is_empty() && meta.pending_reducers.is_empty() {
                    meta.phase = JobPhase::Complete;
                }
            }
        }
        meta
    }

    fn record_failure(meta: &mut JobMetadata, cause: FailCause) {
        if meta.fail_cause.is_none() {
            meta.fail_cause = Some(cause);
        }
        if meta.phase != JobPhase::Complete {
            meta.phase = JobPhase::Cancelling;
        }
    }
}
