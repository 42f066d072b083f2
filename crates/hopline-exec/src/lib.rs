#![forbid(unsafe_code)]
//! hopline-exec: turns a validated graph into running threads.
//!
//! One `StepUnit` per step-copy, each on its own OS thread, connected by
//! bounded `RowChannel`s (one per hop and copy pair). `Transformation` owns a
//! single run: prepare (validate, wire, init) → start → wait. Failures in one
//! unit stop the whole run by aborting every channel.

pub mod failpoints;
pub mod metrics;
pub mod observer;
pub mod producer;
pub mod report;
pub mod runtime;
pub mod scheduler;
pub mod step;

pub use observer::RowCollector;
pub use producer::RowProducer;
pub use report::{ChannelReport, RunResult, UnitReport};
pub use runtime::{ExecError, RunPhase, RuntimeContext, Transformation};
pub use scheduler::StopHandle;
pub use step::StepState;
