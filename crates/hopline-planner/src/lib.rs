#![forbid(unsafe_code)]
//! hopline-planner: from a (YAML) step/hop graph to a checked, ordered graph.
//!
//! Design:
//! - The graph itself is `hopline-core::graph::TransGraph`; this crate only reads it.
//! - `validate` resolves every step type against an explicit `StepRegistry`,
//!   checks hop arity and copy counts, and rejects cycles. Nothing here starts
//!   threads or allocates channels; exec does that after validation succeeds.
//! - `topology` is a Kahn walk over enabled hops, used both for cycle
//!   detection and for the order `explain` prints and exec initializes in.
//! - `dsl::yaml` is the on-disk graph format used by the CLI.

pub mod dsl;
pub mod topology;
pub mod validate;

pub use dsl::yaml::{parse_yaml_graph, ConfigOverrides, DslError, ParsedGraph};
pub use topology::{topological_order, Topology};
pub use validate::{validate, GraphPlan, ValidationError};
