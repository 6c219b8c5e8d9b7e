//! Centralized error handling for the binary entry point.

use crate::error::TrackerError;
use tracing::error;

/// Handles a fatal error and exits with an appropriate status code.
///
/// `TrackerError` gets a code tied to its kind so scripts driving the CLI
/// can distinguish "shutting down, retry" from "bad input" from a plain
/// internal error. Anything else falls back to a generic failure code.
///
/// - `verbose = 0`: message only
/// - `verbose >= 1`: full error chain
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("fatal error: {error}");
    eprintln!("Error: {error}");

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {i}: {cause}");
        }
    }

    let exit_code = match error.downcast_ref::<TrackerError>() {
        Some(TrackerError::ShuttingDown) => 3,
        Some(TrackerError::DuplicateJob(_)) | Some(TrackerError::JobNotFound(_)) => 2,
        Some(TrackerError::InvalidPlan(_)) | Some(TrackerError::InvalidConfig(_)) => 2,
        Some(TrackerError::Io(_)) | None => 1,
    };

    std::process::exit(exit_code)
}
