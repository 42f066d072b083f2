#![forbid(unsafe_code)]
//! hopline: a thread-per-step ETL engine.
//!
//! Re-exports the workspace crates under one name. A transformation graph
//! (`TransGraph`) is validated by the planner, wired into bounded row channels
//! and run with one OS thread per step copy:
//!
//! ```no_run
//! use hopline::prelude::*;
//! use hopline::exec::{RuntimeContext, Transformation};
//!
//! let mut graph = TransGraph::new("demo");
//! graph
//!     .add_step(StepMeta::new("gen", "generate_rows").with_config(serde_json::json!({
//!         "limit": 10,
//!         "fields": [{"name": "n", "type": "Integer", "value": 1}]
//!     })))
//!     .add_step(StepMeta::new("out", "dummy"))
//!     .add_hop(HopMeta::new("gen", "out"));
//!
//! let result = Transformation::execute(graph, RuntimeContext::from_env()).unwrap();
//! assert!(result.success);
//! ```

pub use hopline_channel as channel;
pub use hopline_core as core;
pub use hopline_exec as exec;
pub use hopline_planner as planner;
pub use hopline_steps as steps;

pub mod prelude {
    pub use hopline_core::prelude::*;
    pub use hopline_exec::{RowCollector, RowProducer, RunResult, RuntimeContext, StepState, Transformation};
    pub use hopline_steps::{StepLogic, StepRegistry};
}
