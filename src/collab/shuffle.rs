//! Shuffle collaborator: moves mapper output to the reducers that need it.
//!
//! The tracker's only contract with shuffle is `flush`: once a node's last
//! mapper (or its combiner) finishes, the tracker must be told shuffle has
//! delivered every record before it marks that node's splits done, so a
//! reducer never starts reading a partition that is still in flight.

use crate::tracker::types::{FailCause, JobId, NodeId};
use async_trait::async_trait;

#[async_trait]
pub trait Shuffle: Send + Sync {
    /// Blocks until all output produced by `node` for `job_id` has been
    /// delivered to its destination reducers. Returns the failure if
    /// delivery could not be completed.
    async fn flush(&self, job_id: &JobId, node: &NodeId) -> Result<(), FailCause>;

    /// Fires once per job on the local node when that job reaches
    /// `COMPLETE`, so shuffle can release any per-job resources it was
    /// holding (spill files, buffers) independent of `flush` timing.
    async fn job_finished(&self, job_id: &JobId);
}

/// Local reference implementation: mapper output and reducer input share
/// process memory, so there is nothing to move and `flush` always
/// succeeds immediately. Suitable for single-process integration tests.
#[derive(Default)]
pub struct LocalShuffle;

impl LocalShuffle {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Shuffle for LocalShuffle {
    async fn flush(&self, _job_id: &JobId, _node: &NodeId) -> Result<(), FailCause> {
        Ok(())
    }

    async fn job_finished(&self, _job_id: &JobId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_shuffle_flush_always_succeeds() {
        let shuffle = LocalShuffle::new();
        let job_id = JobId {
            cluster_tag: "c".into(),
            sequence: 0,
        };
        assert!(shuffle.flush(&job_id, &NodeId::from("n1")).await.is_ok());
    }

    #[tokio::test]
    async fn local_shuffle_job_finished_is_a_harmless_no_op() {
        let shuffle = LocalShuffle::new();
        let job_id = JobId {
            cluster_tag: "c".into(),
            sequence: 0,
        };
        shuffle.job_finished(&job_id).await;
    }
}
