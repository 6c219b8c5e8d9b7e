//! Per-node bookkeeping for jobs this node participates in.
//!
//! `LocalJobState` is owned by the node; it is created lazily on first
//! observation of a relevant job and removed once the job reaches
//! `COMPLETE`. It never holds a shared mutable reference to metadata —
//! only small counters and sets describing what this node has already
//! scheduled.

use super::types::{InputSplit, JobId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-node view of which mappers/reducers/combiners are scheduled here,
/// completion counters, and the cancel latch.
#[derive(Debug, Default)]
pub struct LocalJobState {
    curr_mappers: Mutex<HashSet<InputSplit>>,
    curr_reducers: Mutex<HashSet<usize>>,
    completed_mappers: AtomicUsize,
    /// Snapshotted once, at scheduling time, so the "last mapper" check
    /// never races with a later `add_mapper` call adding one more split
    /// than was counted.
    expected_mappers: AtomicUsize,
    expected_mappers_set: AtomicBool,
    cancelled: AtomicBool,
    combine_submitted: AtomicBool,
    terminal_submitted: AtomicBool,
}

impl LocalJobState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true only on first insertion.
    pub fn add_mapper(&self, split: InputSplit) -> bool {
        self.curr_mappers.lock().unwrap().insert(split)
    }

    /// Returns true only on first insertion.
    pub fn add_reducer(&self, index: usize) -> bool {
        self.curr_reducers.lock().unwrap().insert(index)
    }

    pub fn mapper_scheduled(&self, split: &InputSplit) -> bool {
        self.curr_mappers.lock().unwrap().contains(split)
    }

    pub fn reducer_scheduled(&self, index: usize) -> bool {
        self.curr_reducers.lock().unwrap().contains(&index)
    }

    pub fn curr_mappers_snapshot(&self) -> HashSet<InputSplit> {
        self.curr_mappers.lock().unwrap().clone()
    }

    /// Records how many mappers this node expects to run for the job.
    /// Only the first call has any effect: all of a node's mappers are
    /// scheduled in a single controller pass, so the count never changes
    /// afterwards.
    pub fn set_expected_mappers_once(&self, count: usize) {
        if !self.expected_mappers_set.swap(true, Ordering::SeqCst) {
            self.expected_mappers.store(count, Ordering::SeqCst);
        }
    }

    /// Increments the completed-mapper counter and returns the new count.
    pub fn increment_completed_mappers(&self) -> usize {
        self.completed_mappers.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_last_mapper(&self, completed_count: usize) -> bool {
        let expected = self.expected_mappers.load(Ordering::SeqCst);
        expected > 0 && completed_count >= expected
    }

    /// Fires task-executor cancellation at most once per job per node.
    /// Returns true exactly once.
    pub fn on_cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    /// Returns true exactly once: guards against a redundant combine
    /// dispatch if `on_metadata_changed` fires again for the same node
    /// while still in `MAP`.
    pub fn mark_combine_submitted(&self) -> bool {
        !self.combine_submitted.swap(true, Ordering::SeqCst)
    }

    /// Returns true exactly once: guards the per-node half of the
    /// "exactly one COMMIT/ABORT" invariant (uniqueness across nodes is
    /// guaranteed by the update-leader election).
    pub fn mark_terminal_submitted(&self) -> bool {
        !self.terminal_submitted.swap(true, Ordering::SeqCst)
    }
}

/// Process-local map from `JobId` to this node's state for that job.
#[derive(Default)]
pub struct LocalStateRegistry {
    inner: RwLock<HashMap<JobId, Arc<LocalJobState>>>,
}

impl LocalStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, job_id: JobId) -> Arc<LocalJobState> {
        if let Some(state) = self.inner.read().await.get(&job_id) {
            return state.clone();
        }
        let mut guard = self.inner.write().await;
        guard
            .entry(job_id)
            .or_insert_with(|| Arc::new(LocalJobState::new()))
            .clone()
    }

    pub async fn get(&self, job_id: &JobId) -> Option<Arc<LocalJobState>> {
        self.inner.read().await.get(job_id).cloned()
    }

    pub async fn remove(&self, job_id: &JobId) {
        self.inner.write().await.remove(job_id);
    }
}
