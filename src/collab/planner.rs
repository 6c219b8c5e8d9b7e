//! Planning collaborator: turns a job's inputs into a [`MapReducePlan`].
//!
//! Planning happens once, at submission time, before any metadata is
//! written to the store — a failed plan means the job never exists.

use crate::tracker::types::{InputSplit, JobInfo, MapReducePlan, NodeId};
use async_trait::async_trait;
use std::collections::BTreeMap;

#[async_trait]
pub trait Planner: Send + Sync {
    /// Produces a validated plan assigning `job.input_paths` across
    /// `nodes` and reducer indices `0..job.reducers` likewise. Returns an
    /// error if no plan can satisfy the job (e.g. reducers requested but
    /// no live nodes).
    async fn plan(&self, job: &JobInfo, nodes: &[NodeId]) -> Result<MapReducePlan, String>;
}

/// Assigns splits and reducers to nodes round-robin, in node order. One
/// split per input path; deterministic given the same node ordering, so
/// tests can assert on exact task numbers.
#[derive(Default)]
pub struct RoundRobinPlanner;

impl RoundRobinPlanner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Planner for RoundRobinPlanner {
    async fn plan(&self, job: &JobInfo, nodes: &[NodeId]) -> Result<MapReducePlan, String> {
        if nodes.is_empty() {
            return Err("no live nodes to plan against".into());
        }
        let mut mappers: BTreeMap<NodeId, Vec<InputSplit>> = BTreeMap::new();
        for (i, path) in job.input_paths.iter().enumerate() {
            let node = nodes[i % nodes.len()].clone();
            mappers
                .entry(node)
                .or_default()
                .push(InputSplit::new(path.clone()));
        }
        let mut reducers: BTreeMap<NodeId, Vec<usize>> = BTreeMap::new();
        for index in 0..job.reducers {
            let node = nodes[index % nodes.len()].clone();
            reducers.entry(node).or_default().push(index);
        }
        MapReducePlan::new(mappers, reducers, job.reducers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn distributes_splits_and_reducers_round_robin() {
        let planner = RoundRobinPlanner::new();
        let job = JobInfo::new(
            vec!["a".into(), "b".into(), "c".into()],
            "out",
            2,
        );
        let nodes = vec![NodeId::from("n1"), NodeId::from("n2")];
        let plan = planner.plan(&job, &nodes).await.unwrap();
        assert_eq!(plan.splits_for(&NodeId::from("n1")).len(), 2);
        assert_eq!(plan.splits_for(&NodeId::from("n2")).len(), 1);
        assert_eq!(plan.reducer_count(), 2);
    }

    #[tokio::test]
    async fn empty_node_list_is_rejected() {
        let planner = RoundRobinPlanner::new();
        let job = JobInfo::new(vec!["a".into()], "out", 0);
        assert!(planner.plan(&job, &[]).await.is_err());
    }
}
