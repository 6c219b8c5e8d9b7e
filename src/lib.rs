//! # mr-tracker
//!
//! A replicated MapReduce job tracker: drives map, optional per-node
//! combine, and reduce tasks to completion across a cluster with no
//! central master. Every node runs an identical copy of the tracker
//! against a shared replicated store; job metadata is a value type
//! mutated only through pure transform closures, so any node observing a
//! change can react to it independently and arrive at the same decision.
//!
//! ## Modules
//!
//! - `tracker` - the eight tracker components: metadata and transforms,
//!   per-node bookkeeping, the event dispatcher, the lifecycle
//!   controller, the submission/status API, the shutdown busy-gate, and
//!   the task completion handler.
//! - `collab` - external collaborators the tracker depends on through
//!   traits: the replicated store, task execution, shuffle, cluster
//!   discovery, planning, and job resolution.
//! - `app` - CLI-facing wiring: configuration, logging, and runtime
//!   assembly of a `Tracker` from the in-process reference collaborators.
//! - `cli` - the `jobctl` command-line interface.
//! - `error` - the crate's error type.

pub mod app;
pub mod cli;
pub mod collab;
pub mod error;
pub mod tracker;
