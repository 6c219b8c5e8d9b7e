//! Shared types for the MapReduce job tracker.
//!
//! These are the value types that flow through the replicated store: they
//! are plain data, cheap to clone, and carry no behaviour beyond small
//! deterministic helpers (task numbering, node lookups).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Opaque globally unique job identifier: a cluster tag plus a
/// monotonically increasing local counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId {
    pub cluster_tag: String,
    pub sequence: u64,
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.cluster_tag, self.sequence)
    }
}

/// Generates unique `JobId`s for a single cluster tag.
pub struct JobIdGenerator {
    cluster_tag: String,
    next: AtomicU64,
}

impl JobIdGenerator {
    pub fn new(cluster_tag: impl Into<String>) -> Self {
        Self {
            cluster_tag: cluster_tag.into(),
            next: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> JobId {
        let sequence = self.next.fetch_add(1, Ordering::Relaxed);
        JobId {
            cluster_tag: self.cluster_tag.clone(),
            sequence,
        }
    }
}

/// Opaque node identifier. Ordered so the update-leader election in the
/// lifecycle controller has a total, deterministic order to compare over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

/// Opaque identity for a slice of input data. Carries enough information
/// for the task executor to read its data; the tracker itself only needs
/// it to be comparable and hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputSplit {
    pub id: String,
    /// Opaque locality/location hint handed to the task executor; the
    /// tracker never interprets this field.
    pub locality_hint: Option<String>,
}

impl InputSplit {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            locality_hint: None,
        }
    }
}

impl fmt::Display for InputSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Coarse-grained phase of a job.
///
/// Legal transitions: `Setup -> Map -> Reduce -> Complete`, with combine
/// running implicitly per-node inside `Map`. Any of `Setup`, `Map`, or
/// `Reduce` may move to `Cancelling`; `Cancelling` only ever moves to
/// `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobPhase {
    Setup,
    Map,
    Reduce,
    Cancelling,
    Complete,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobPhase::Setup => "SETUP",
            JobPhase::Map => "MAP",
            JobPhase::Reduce => "REDUCE",
            JobPhase::Cancelling => "CANCELLING",
            JobPhase::Complete => "COMPLETE",
        };
        write!(f, "{s}")
    }
}

/// Kind of failure that put a job on the cancellation path, mirroring the
/// error taxonomy in the design: the core never retries on its own, and
/// once a cause is recorded it is carried through to the completion
/// handle unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailKind {
    TaskFailure,
    NodeLoss,
    ShuffleError,
    PlannerError,
    Shutdown,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailCause {
    pub kind: FailKind,
    pub message: String,
}

impl FailCause {
    pub fn new(kind: FailKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn task_failure(message: impl Into<String>) -> Self {
        Self::new(FailKind::TaskFailure, message)
    }

    pub fn node_loss(message: impl Into<String>) -> Self {
        Self::new(FailKind::NodeLoss, message)
    }

    pub fn shuffle_error(message: impl Into<String>) -> Self {
        Self::new(FailKind::ShuffleError, message)
    }

    pub fn planner_error(message: impl Into<String>) -> Self {
        Self::new(FailKind::PlannerError, message)
    }

    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::new(FailKind::Shutdown, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailKind::NotFound, message)
    }
}

impl fmt::Display for FailCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FailCause {}

/// User-provided job descriptor. Immutable after submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub input_paths: Vec<String>,
    pub output_path: String,
    pub reducers: usize,
    #[serde(default)]
    pub config: HashMap<String, String>,
    /// When this job was submitted, for logging and for the
    /// finished-job TTL countdown.
    pub submitted_at: DateTime<Utc>,
}

impl JobInfo {
    pub fn new(input_paths: Vec<String>, output_path: impl Into<String>, reducers: usize) -> Self {
        Self {
            input_paths,
            output_path: output_path.into(),
            reducers,
            config: HashMap::new(),
            submitted_at: Utc::now(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Whether this job runs in a separate process rather than in-tracker.
    pub fn external_execution(&self) -> bool {
        self.config
            .get("external_execution")
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    /// Whether this job runs a combiner after its mappers finish.
    pub fn has_combiner(&self) -> bool {
        self.config
            .get("combiner")
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    /// How long completed metadata survives in the store before eviction.
    pub fn finished_job_info_ttl(&self) -> Duration {
        self.config
            .get("finished_job_info_ttl")
            .and_then(|v| humantime::parse_duration(v).ok())
            .unwrap_or(Duration::from_secs(300))
    }
}

/// Assignment of splits to mapper-hosting nodes and reducer indices to
/// reducer-hosting nodes. Immutable for the life of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapReducePlan {
    mappers: BTreeMap<NodeId, Vec<InputSplit>>,
    reducers: BTreeMap<NodeId, Vec<usize>>,
    reducer_count: usize,
}

impl MapReducePlan {
    /// Builds a plan, validating that the reducer assignment covers
    /// exactly `0..reducer_count` with no duplicates.
    pub fn new(
        mappers: BTreeMap<NodeId, Vec<InputSplit>>,
        reducers: BTreeMap<NodeId, Vec<usize>>,
        reducer_count: usize,
    ) -> Result<Self, String> {
        let mut seen = BTreeSet::new();
        for idx in reducers.values().flatten() {
            if *idx >= reducer_count {
                return Err(format!("reducer index {idx} out of range 0..{reducer_count}"));
            }
            if !seen.insert(*idx) {
                return Err(format!("reducer index {idx} assigned to more than one node"));
            }
        }
        if seen.len() != reducer_count {
            return Err(format!(
                "plan assigns {} of {reducer_count} reducers",
                seen.len()
            ));
        }
        Ok(Self {
            mappers,
            reducers,
            reducer_count,
        })
    }

    pub fn reducer_count(&self) -> usize {
        self.reducer_count
    }

    pub fn splits_for(&self, node: &NodeId) -> &[InputSplit] {
        self.mappers.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn reducers_for(&self, node: &NodeId) -> &[usize] {
        self.reducers.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_splits(&self) -> BTreeSet<InputSplit> {
        self.mappers.values().flatten().cloned().collect()
    }

    /// Union of every node hosting a mapper or reducer in this plan.
    pub fn nodes(&self) -> BTreeSet<NodeId> {
        self.mappers
            .keys()
            .chain(self.reducers.keys())
            .cloned()
            .collect()
    }

    pub fn node_for_split(&self, split: &InputSplit) -> Option<&NodeId> {
        self.mappers
            .iter()
            .find(|(_, splits)| splits.contains(split))
            .map(|(node, _)| node)
    }

    pub fn node_for_reducer(&self, index: usize) -> Option<&NodeId> {
        self.reducers
            .iter()
            .find(|(_, indices)| indices.contains(&index))
            .map(|(node, _)| node)
    }

    /// Deterministic index of `split` among all splits in the plan,
    /// ordered by node id then by assignment order within the node.
    pub fn task_number(&self, split: &InputSplit) -> u32 {
        let mut number = 0u32;
        for splits in self.mappers.values() {
            for s in splits {
                if s == split {
                    return number;
                }
                number += 1;
            }
        }
        number
    }

    /// Deterministic index used to label a node's combine task attempt.
    pub fn combine_task_number(&self, node: &NodeId) -> u32 {
        self.mappers
            .keys()
            .position(|n| n == node)
            .map(|i| i as u32)
            .unwrap_or(0)
    }
}
