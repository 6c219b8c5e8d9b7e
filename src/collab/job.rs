//! Job factory collaborator.
//!
//! `JobInfo` carries everything the tracker core needs; it knows nothing
//! about how mapper/reducer/combiner functions are looked up or linked.
//! That resolution step belongs to a [`JobFactory`], which is expected to
//! live outside the tracker crate in any real deployment. [`Job`] is the
//! handle the factory hands back: opaque to the tracker beyond the
//! `has_combiner` flag it was already told about via `JobInfo::config`.

use crate::tracker::types::JobInfo;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Opaque resolved job handle. The tracker only ever stores and passes
/// this around; it never inspects `name`.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
}

#[async_trait]
pub trait JobFactory: Send + Sync {
    /// Resolves `info` into a runnable `Job`. Failure here means the
    /// requested mapper/reducer/combiner could not be located or linked,
    /// and the submission is rejected before any plan is made.
    async fn create(&self, info: &JobInfo) -> Result<Job, String>;
}

/// Name resolved when a `JobInfo` carries no `job_name` config key.
/// Reference wiring (tests, the bundled CLI) never needs more than one
/// job implementation, so this lets `submit()` work out of the box
/// without every caller registering a name first.
const DEFAULT_JOB_NAME: &str = "default";

/// Resolves a job from its `config["job_name"]` key against a
/// process-local registry populated at startup, falling back to an
/// unregistered `"default"` job when the key is absent. Suitable for
/// embedding the tracker in a binary that registers its own job
/// implementations under distinct names.
pub struct DefaultJobFactory {
    registry: RwLock<HashMap<String, Arc<Job>>>,
}

impl DefaultJobFactory {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, name: impl Into<String>) {
        let name = name.into();
        self.registry
            .write()
            .await
            .insert(name.clone(), Arc::new(Job { name }));
    }
}

impl Default for DefaultJobFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobFactory for DefaultJobFactory {
    async fn create(&self, info: &JobInfo) -> Result<Job, String> {
        let name = info.config.get("job_name").map(String::as_str);
        let Some(name) = name else {
            return Ok(Job {
                name: DEFAULT_JOB_NAME.to_string(),
            });
        };
        self.registry
            .read()
            .await
            .get(name)
            .map(|job| (**job).clone())
            .ok_or_else(|| format!("no job registered under name {name:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_resolves_registered_job_by_name() {
        let factory = DefaultJobFactory::new();
        factory.register("wordcount").await;
        let info = JobInfo::new(vec!["in".into()], "out", 1)
            .with_config("job_name", "wordcount");
        let job = factory.create(&info).await.unwrap();
        assert_eq!(job.name, "wordcount");
    }

    #[tokio::test]
    async fn create_fails_for_unknown_job_name() {
        let factory = DefaultJobFactory::new();
        let info = JobInfo::new(vec!["in".into()], "out", 1)
            .with_config("job_name", "missing");
        assert!(factory.create(&info).await.is_err());
    }

    #[tokio::test]
    async fn create_resolves_to_default_job_when_name_is_unset() {
        let factory = DefaultJobFactory::new();
        let info = JobInfo::new(vec!["in".into()], "out", 1);
        let job = factory.create(&info).await.unwrap();
        assert_eq!(job.name, "default");
    }
}
