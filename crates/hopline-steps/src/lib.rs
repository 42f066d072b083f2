#![forbid(unsafe_code)]
//! hopline-steps: what a step *is* to the scheduler, plus the built-in steps.
//!
//! Design intent:
//! - One capability trait (`StepLogic`: init / process_batch / dispose); no base
//!   class hierarchy. Per-type behaviour is a separate implementation.
//! - Step types are resolved through an explicit `StepRegistry` value handed to
//!   each run, never through global state.
//! - Steps only see rows through `StepIo`, which owns the unit's channel ends
//!   and invokes row listeners as rows cross the boundary.

pub mod counters;
pub mod io;
pub mod registry;
pub mod traits;

pub mod abort;
pub mod append;
pub mod dummy;
pub mod filter;
pub mod generate;
pub mod injector;
pub mod select;

pub use counters::UnitCounters;
pub use io::{RowListener, StepIo};
pub use registry::{StepRegistry, StepTypeDecl};
pub use traits::{BatchOutcome, StepContext, StepError, StepLogic};
