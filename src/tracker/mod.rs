//! The distributed MapReduce job tracker, assembled from its eight
//! components: job metadata and transforms (C1), per-node bookkeeping
//! (C2), the replicated store gateway (C3, in [`crate::collab::store`]),
//! the event dispatcher (C4), the lifecycle controller (C5), the
//! submission/status API (C6), the shutdown busy-gate (C7), and the task
//! completion handler (C8).

pub mod api;
pub mod completion;
pub mod dispatcher;
pub mod finish;
pub mod lifecycle;
pub mod local_state;
pub mod metadata;
pub mod shutdown;
pub mod types;

pub use api::JobTracker;
pub use finish::JobHandle;
pub use metadata::{JobMetadata, MetadataTransform};
pub use shutdown::BusyGate;
pub use types::{FailCause, FailKind, InputSplit, JobId, JobInfo, JobPhase, MapReducePlan, NodeId};

use crate::collab::{ChangeBatch, Discovery, JobFactory, NodeEvent, Planner, Shuffle, StoreBackend, TaskExecutor};
use dispatcher::{DispatchEvent, EventDispatcher};
use finish::FinishFutureRegistry;
use lifecycle::LifecycleController;
use local_state::LocalStateRegistry;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Owns every collaborator and background task for one node's tracker
/// instance. Dropping it leaves the dispatcher and subscription-forwarder
/// tasks running; call [`Tracker::shutdown`] to drain and stop them.
pub struct Tracker {
    pub api: Arc<JobTracker>,
    gate: Arc<BusyGate>,
    dispatcher: Arc<EventDispatcher>,
    dispatcher_handle: JoinHandle<()>,
    /// The store/discovery feed forwarders hold their own `Arc` clones
    /// of the channels they read and of `dispatcher`, so nothing ever
    /// drops those on its own; `shutdown_tx` is what actually stops them.
    /// Without it their `rx.recv().await` would block forever and
    /// `shutdown` would hang waiting on handles that never finish. A
    /// `watch` channel (rather than `Notify`) is used so a forwarder that
    /// has not yet reached its `select!` on shutdown still observes the
    /// flag on its very next poll instead of missing a one-shot wakeup.
    shutdown_tx: watch::Sender<bool>,
    forwarders: Vec<JoinHandle<()>>,
    finishes: Arc<FinishFutureRegistry>,
}

#[allow(clippy::too_many_arguments)]
pub struct TrackerDeps {
    pub node_id: NodeId,
    pub cluster_tag: String,
    pub store: Arc<dyn StoreBackend>,
    pub executor: Arc<dyn TaskExecutor>,
    /// Used only for tasks belonging to jobs with `external_execution`
    /// set; COMMIT/ABORT always go through `executor` regardless.
    pub external_executor: Arc<dyn TaskExecutor>,
    pub shuffle: Arc<dyn Shuffle>,
    pub discovery: Arc<dyn Discovery>,
    pub planner: Arc<dyn Planner>,
    pub job_factory: Arc<dyn JobFactory>,
}

impl Tracker {
    /// Wires every collaborator together, subscribes to the store and
    /// discovery change feeds, and spawns the dispatcher worker. The
    /// returned tracker is immediately ready to accept `submit`/`status`
    /// calls through `self.api`.
    pub fn start(deps: TrackerDeps) -> Self {
        let gate = Arc::new(BusyGate::new());
        let finishes = Arc::new(FinishFutureRegistry::new());
        let local_states = Arc::new(LocalStateRegistry::new());

        let controller = Arc::new(LifecycleController::new(
            deps.node_id.clone(),
            deps.store.clone(),
            deps.executor,
            deps.external_executor,
            deps.shuffle,
            deps.discovery.clone(),
            deps.planner.clone(),
            local_states.clone(),
            finishes.clone(),
        ));
        let (dispatcher, dispatcher_handle) = EventDispatcher::spawn(gate.clone(), controller);
        let dispatcher = Arc::new(dispatcher);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let forwarders = vec![
            spawn_store_forwarder(deps.store.clone(), dispatcher.clone(), shutdown_rx.clone()),
            spawn_discovery_forwarder(deps.discovery.clone(), dispatcher.clone(), shutdown_rx.clone()),
        ];

        let api = Arc::new(JobTracker::new(
            deps.node_id,
            deps.cluster_tag,
            deps.store,
            deps.discovery,
            deps.planner,
            deps.job_factory,
            gate.clone(),
            finishes.clone(),
            local_states,
        ));

        Self {
            api,
            gate,
            dispatcher,
            dispatcher_handle,
            shutdown_tx,
            forwarders,
            finishes,
        }
    }

    /// Closes the busy gate (rejecting every new `submit`/`status` call
    /// and halting dispatch of further events), stops the feed
    /// forwarders, drops the dispatcher so its worker task's channel
    /// closes and it can exit on its own, then fails every completion
    /// future still outstanding so no caller waits on a `JobHandle`
    /// forever just because this node stopped mid-job.
    pub async fn shutdown(self) {
        info!("tracker shutdown starting");
        let _write_hold = self.gate.close().await;

        let _ = self.shutdown_tx.send(true);
        for handle in self.forwarders {
            let _ = handle.await;
        }

        drop(self.dispatcher);
        let _ = self.dispatcher_handle.await;

        self.finishes
            .fail_all(FailCause::shutdown("tracker is stopping"))
            .await;
        info!("tracker shutdown complete");
    }
}

fn spawn_store_forwarder(
    store: Arc<dyn StoreBackend>,
    dispatcher: Arc<EventDispatcher>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut rx = store.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                msg = rx.recv() => match msg {
                    Ok(batch) => forward_batch(&dispatcher, batch),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "store change feed lagged, missed batches dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    })
}

fn forward_batch(dispatcher: &Arc<EventDispatcher>, batch: ChangeBatch) {
    dispatcher.enqueue(DispatchEvent::MetadataChanged(batch));
}

fn spawn_discovery_forwarder(
    discovery: Arc<dyn Discovery>,
    dispatcher: Arc<EventDispatcher>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut rx = discovery.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                msg = rx.recv() => match msg {
                    Ok(event) => forward_node_event(&dispatcher, event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "discovery feed lagged, missed events dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    })
}

fn forward_node_event(dispatcher: &Arc<EventDispatcher>, event: NodeEvent) {
    dispatcher.enqueue(DispatchEvent::NodeEvent(event));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{DefaultJobFactory, ExternalExecutor, InMemoryStore, InProcessExecutor, LocalShuffle, RoundRobinPlanner, StaticDiscovery};
    use std::time::Duration;

    fn deps() -> TrackerDeps {
        TrackerDeps {
            node_id: NodeId::from("n1"),
            cluster_tag: "cluster".into(),
            store: Arc::new(InMemoryStore::new()),
            executor: Arc::new(InProcessExecutor::new()),
            external_executor: Arc::new(ExternalExecutor::new()),
            shuffle: Arc::new(LocalShuffle::new()),
            discovery: Arc::new(StaticDiscovery::new([NodeId::from("n1")])),
            planner: Arc::new(RoundRobinPlanner::new()),
            job_factory: Arc::new(DefaultJobFactory::new()),
        }
    }

    #[tokio::test]
    async fn single_node_job_with_no_reducers_runs_to_completion() {
        let tracker = Tracker::start(deps());
        let info = JobInfo::new(vec!["a".into()], "out", 0);
        let (_job_id, handle) = tracker.api.submit(info).await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("job should finish within timeout");
        assert!(result.is_ok());
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_rejects_new_submissions() {
        let tracker = Tracker::start(deps());
        let api = tracker.api.clone();
        tracker.shutdown().await;
        let info = JobInfo::new(vec!["a".into()], "out", 0);
        assert!(matches!(
            api.submit(info).await,
            Err(crate::error::TrackerError::ShuttingDown)
        ));
    }

    /// Submits tasks that never report back, so a job dispatched through
    /// it is guaranteed to still be outstanding whenever shutdown runs —
    /// otherwise `InProcessExecutor`'s near-instant completions would
    /// race shutdown for who resolves the completion future first.
    #[derive(Default)]
    struct StuckExecutor;

    #[async_trait::async_trait]
    impl crate::collab::TaskExecutor for StuckExecutor {
        async fn submit(
            &self,
            _task: crate::collab::TaskDescriptor,
            _listener: Arc<dyn crate::collab::TaskCompletionListener>,
        ) {
        }

        async fn cancel(&self, _job_id: &JobId) {}

        async fn on_job_state_changed(&self, _job_id: &JobId, _meta: &JobMetadata) {}
    }

    #[tokio::test]
    async fn shutdown_fails_a_job_still_in_flight() {
        let mut deps = deps();
        deps.executor = Arc::new(StuckExecutor);
        let tracker = Tracker::start(deps);
        let info = JobInfo::new(vec!["a".into(), "b".into()], "out", 1);
        let (_job_id, handle) = tracker.api.submit(info).await.unwrap();
        tracker.shutdown().await;
        let result = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("shutdown must resolve outstanding completion futures");
        assert!(matches!(
            result,
            Err(cause) if cause.kind == crate::tracker::FailKind::Shutdown
        ));
    }
}
