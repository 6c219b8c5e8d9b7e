//! Single-threaded event dispatcher (C4).
//!
//! Every metadata change and node event funnels through one unbounded
//! channel and one worker task, so the lifecycle controller never has to
//! reason about concurrent invocations of `on_metadata_changed` or
//! `on_node_event` for the same job. Dispatch is gated: once shutdown has
//! started, queued events are drained and dropped rather than acted on.

use super::lifecycle::LifecycleController;
use super::shutdown::BusyGate;
use crate::collab::{ChangeBatch, NodeEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

pub enum DispatchEvent {
    MetadataChanged(ChangeBatch),
    NodeEvent(NodeEvent),
}

pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<DispatchEvent>,
}

impl EventDispatcher {
    /// Spawns the worker task and returns a handle to enqueue events plus
    /// a join handle the caller should await during shutdown, after the
    /// gate has been closed and the sender dropped.
    pub fn spawn(gate: Arc<BusyGate>, controller: Arc<LifecycleController>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<DispatchEvent>();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Ok(_hold) = gate.try_read() else {
                    trace!("dispatcher dropping event received after shutdown");
                    continue;
                };
                match event {
                    DispatchEvent::MetadataChanged(batch) => {
                        for (job_id, meta) in batch {
                            debug!(%job_id, phase = %meta.phase, "dispatching metadata change");
                            controller.on_metadata_changed(meta).await;
                        }
                    }
                    DispatchEvent::NodeEvent(ev) => {
                        controller.on_node_event(ev).await;
                    }
                }
            }
            debug!("event dispatcher worker exiting, channel closed");
        });
        (Self { tx }, handle)
    }

    /// Queues an event. Silently dropped if the worker has already
    /// exited (channel closed), which only happens after shutdown.
    pub fn enqueue(&self, event: DispatchEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{InMemoryStore, LocalShuffle, RoundRobinPlanner, StaticDiscovery, TaskExecutor};
    use crate::collab::InProcessExecutor;
    use crate::tracker::finish::FinishFutureRegistry;
    use crate::tracker::local_state::LocalStateRegistry;
    use crate::tracker::types::NodeId;
    use std::sync::Arc as StdArc;

    fn test_controller() -> Arc<LifecycleController> {
        Arc::new(LifecycleController::new(
            NodeId::from("n1"),
            StdArc::new(InMemoryStore::new()),
            StdArc::new(InProcessExecutor::new()) as StdArc<dyn TaskExecutor>,
            StdArc::new(InProcessExecutor::new()) as StdArc<dyn TaskExecutor>,
            StdArc::new(LocalShuffle::new()),
            StdArc::new(StaticDiscovery::new([NodeId::from("n1")])),
            StdArc::new(RoundRobinPlanner::new()),
            Arc::new(LocalStateRegistry::new()),
            Arc::new(FinishFutureRegistry::new()),
        ))
    }

    #[tokio::test]
    async fn events_enqueued_after_close_are_dropped_not_processed() {
        let gate = Arc::new(BusyGate::new());
        let controller = test_controller();
        let (dispatcher, handle) = EventDispatcher::spawn(gate.clone(), controller);
        let _write_hold = gate.close().await;
        dispatcher.enqueue(DispatchEvent::NodeEvent(NodeEvent::Left(NodeId::from("gone"))));
        drop(dispatcher);
        handle.await.unwrap();
    }
}
