#![forbid(unsafe_code)]
//! hopline-core: shared types for the hopline execution engine.
//!
//! - Row schemas, typed values, and rows that flow through channels.
//! - The static step/hop graph (`TransGraph`) a run is instantiated from.
//! - Engine configuration, strongly-typed ids, hashing, and the run manifest.
//!
//! No threads and no I/O live here; the channel, steps, and exec crates build on top.

pub mod config;
pub mod error;
pub mod graph;
pub mod hash;
pub mod id;
pub mod manifest;
pub mod prelude;
pub mod schema;
pub mod types;

/// Engine version string recorded in run manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
