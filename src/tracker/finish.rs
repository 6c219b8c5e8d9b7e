//! Completion handles for submitted jobs.
//!
//! `submit()` and `status()` both need to hand back a future that
//! resolves when the job finishes, and `status()` may be called many
//! times for the same job. A plain `oneshot::Receiver` is single-consumer,
//! so the registry wraps it in a [`futures::future::Shared`] clone-able
//! future, created once per job and handed out to every caller.

use super::types::{FailCause, JobId};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::{oneshot, RwLock};

pub type FinishFuture = Shared<BoxFuture<'static, Result<JobId, FailCause>>>;

/// A completion handle returned from `submit()` and `status()`.
#[derive(Clone)]
pub struct JobHandle(pub(crate) FinishFuture);

impl JobHandle {
    pub async fn wait(self) -> Result<JobId, FailCause> {
        self.0.await
    }
}

impl Future for JobHandle {
    type Output = Result<JobId, FailCause>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

struct FinishEntry {
    sender: Option<oneshot::Sender<Result<JobId, FailCause>>>,
    future: FinishFuture,
}

/// One pending-or-resolved completion future per submitted job, shared
/// between the submission API and the lifecycle controller that
/// eventually resolves it.
#[derive(Default)]
pub struct FinishFutureRegistry {
    inner: RwLock<HashMap<JobId, FinishEntry>>,
}

impl FinishFutureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn make_entry(job_id: JobId) -> FinishEntry {
        let (tx, rx) = oneshot::channel::<Result<JobId, FailCause>>();
        let dropped_id = job_id;
        let fut: BoxFuture<'static, Result<JobId, FailCause>> = async move {
            rx.await
                .unwrap_or_else(|_| Err(FailCause::shutdown(format!("job {dropped_id} dropped"))))
        }
        .boxed();
        FinishEntry {
            sender: Some(tx),
            future: fut.shared(),
        }
    }

    /// Registers a brand-new completion future for `job_id`. Returns
    /// `None` if one is already registered (duplicate submission).
    pub async fn register_new(&self, job_id: JobId) -> Option<FinishFuture> {
        let mut guard = self.inner.write().await;
        if guard.contains_key(&job_id) {
            return None;
        }
        let entry = Self::make_entry(job_id.clone());
        let fut = entry.future.clone();
        guard.insert(job_id, entry);
        Some(fut)
    }

    /// Returns the existing completion future for `job_id`, creating one
    /// if absent.
    pub async fn get_or_create(&self, job_id: JobId) -> FinishFuture {
        {
            let guard = self.inner.read().await;
            if let Some(entry) = guard.get(&job_id) {
                return entry.future.clone();
            }
        }
        let mut guard = self.inner.write().await;
        if let Some(entry) = guard.get(&job_id) {
            return entry.future.clone();
        }
        let entry = Self::make_entry(job_id.clone());
        let fut = entry.future.clone();
        guard.insert(job_id, entry);
        fut
    }

    /// Resolves and removes the completion future for `job_id`. A no-op
    /// if no future is registered.
    pub async fn complete(&self, job_id: &JobId, result: Result<JobId, FailCause>) {
        let mut guard = self.inner.write().await;
        if let Some(mut entry) = guard.remove(job_id) {
            if let Some(sender) = entry.sender.take() {
                let _ = sender.send(result);
            }
        }
    }

    /// Fails every outstanding completion future with `cause`, used by
    /// shutdown.
    pub async fn fail_all(&self, cause: FailCause) {
        let mut guard = self.inner.write().await;
        for (_job_id, mut entry) in guard.drain() {
            if let Some(sender) = entry.sender.take() {
                let _ = sender.send(Err(cause.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_id() -> JobId {
        JobId {
            cluster_tag: "c".into(),
            sequence: 1,
        }
    }

    #[tokio::test]
    async fn duplicate_registration_returns_none() {
        let registry = FinishFutureRegistry::new();
        assert!(registry.register_new(job_id()).await.is_some());
        assert!(registry.register_new(job_id()).await.is_none());
    }

    #[tokio::test]
    async fn multiple_waiters_observe_the_same_completion() {
        let registry = FinishFutureRegistry::new();
        let fut1 = registry.register_new(job_id()).await.unwrap();
        let fut2 = registry.get_or_create(job_id()).await;
        registry.complete(&job_id(), Ok(job_id())).await;
        assert_eq!(fut1.await.unwrap(), job_id());
        assert_eq!(fut2.await.unwrap(), job_id());
    }

    #[tokio::test]
    async fn fail_all_resolves_every_pending_future() {
        let registry = FinishFutureRegistry::new();
        let fut = registry.register_new(job_id()).await.unwrap();
        registry
            .fail_all(FailCause::shutdown("stopping"))
            .await;
        assert!(fut.await.is_err());
    }
}
