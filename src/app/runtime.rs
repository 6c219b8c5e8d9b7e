//! Runtime initialization: wires up logging and assembles a [`Tracker`]
//! backed by the in-process reference collaborators.
//!
//! A real cluster deployment would substitute a networked store,
//! discovery service, and worker-pool executor here; everything above
//! this module is indifferent to which implementations are plugged in.

use crate::app::{config::AppConfig, logging::init_logging};
use crate::collab::{ExternalExecutor, InMemoryStore, InProcessExecutor, JobFactory, LocalShuffle, RoundRobinPlanner, StaticDiscovery};
use crate::tracker::{NodeId, Tracker, TrackerDeps};
use anyhow::Result;
use std::sync::Arc;

/// Initializes logging and assembles a single-process [`Tracker`] for
/// `config`'s node id and cluster tag, resolving jobs through
/// `job_factory`. Callers that embed the tracker supply their own
/// factory, pre-populated with whatever mapper/reducer/combiner
/// implementations their binary links in.
pub async fn initialize_app(config: AppConfig, job_factory: Arc<dyn JobFactory>) -> Result<Tracker> {
    init_logging(&config);

    let node_id = NodeId::from(config.node_id.as_str());
    let deps = TrackerDeps {
        node_id: node_id.clone(),
        cluster_tag: config.cluster_tag,
        store: Arc::new(InMemoryStore::new()),
        executor: Arc::new(InProcessExecutor::new()),
        external_executor: Arc::new(ExternalExecutor::new()),
        shuffle: Arc::new(LocalShuffle::new()),
        discovery: Arc::new(StaticDiscovery::new([node_id])),
        planner: Arc::new(RoundRobinPlanner::new()),
        job_factory,
    };

    Ok(Tracker::start(deps))
}
