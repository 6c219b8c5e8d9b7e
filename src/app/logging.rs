//! Logging configuration and initialization.

use crate::app::config::AppConfig;
use tracing::debug;

/// Initializes tracing for the application.
pub fn init_logging(config: &AppConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level())
        .with_target(config.verbose >= 2)
        .with_thread_ids(config.verbose >= 3)
        .with_line_number(config.verbose >= 3)
        .init();

    debug!(node_id = %config.node_id, cluster_tag = %config.cluster_tag, "tracker starting");
}

/// Initializes tracing from just a verbosity level, for callers (tests,
/// examples) that do not otherwise build an `AppConfig`.
pub fn init_tracing(verbose: u8) {
    let config = AppConfig {
        verbose,
        ..AppConfig::default()
    };
    init_logging(&config);
}
