//! Application configuration.
//!
//! Settings that shape how the binary starts up (verbosity, this node's
//! identity, the cluster tag it submits jobs under) as opposed to
//! [`crate::tracker::types::JobInfo`], which shapes one job.

use anyhow::Result;
use std::env;

/// Application-wide configuration resolved from CLI flags and
/// environment variables at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub verbose: u8,
    pub node_id: String,
    pub cluster_tag: String,
}

impl AppConfig {
    /// Builds configuration from verbosity plus environment variables:
    /// `MR_TRACKER_NODE_ID` (falls back to `"local"`) and
    /// `MR_TRACKER_CLUSTER_TAG` (falls back to `"default"`).
    pub fn new(verbose: u8) -> Result<Self> {
        let node_id = env::var("MR_TRACKER_NODE_ID").unwrap_or_else(|_| "local".to_string());
        let cluster_tag =
            env::var("MR_TRACKER_CLUSTER_TAG").unwrap_or_else(|_| "default".to_string());

        Ok(Self {
            verbose,
            node_id,
            cluster_tag,
        })
    }

    /// Log level string derived from verbosity, following the tracing
    /// `EnvFilter` directive syntax.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            2 => "trace",
            _ => "trace,tokio=debug",
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            node_id: "local".to_string(),
            cluster_tag: "default".to_string(),
        }
    }
}
