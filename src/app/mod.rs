//! Application-level wiring: configuration, logging setup, and runtime
//! assembly of the tracker, kept separate from `tracker::` itself so the
//! core crate stays embeddable without pulling in CLI concerns.

pub mod config;
pub mod error_handling;
pub mod logging;
pub mod runtime;

pub use config::AppConfig;
pub use error_handling::handle_fatal_error;
pub use logging::init_logging;
pub use runtime::initialize_app;
