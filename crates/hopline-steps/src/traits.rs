//! Step capability interface.
//!
//! The exec runtime calls `init(...)` on every step before any thread starts,
//! then drives `process_batch(...)` on the unit's own thread until it reports
//! `Finished`, fails, or the run is stopped, and finally calls `dispose()`.

use serde::de::DeserializeOwned;
use thiserror::Error;

use hopline_channel::ChannelError;
use hopline_core::config::EngineConfig;
use hopline_core::graph::StepMeta;

use crate::io::StepIo;

#[derive(Debug, Error)]
pub enum StepError {
    #[error("configuration error: {0}")]
    Config(String),

    /// A single row could not be processed. The step's error policy decides
    /// whether the unit skips it or fails.
    #[error("data error: {0}")]
    Data(String),

    /// The unit cannot continue.
    #[error("fatal error: {0}")]
    Fatal(String),

    /// A channel was aborted underneath the step; the run is being stopped.
    #[error("stopped: channel aborted")]
    Aborted,
}

impl From<ChannelError> for StepError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Aborted => StepError::Aborted,
            ChannelError::Closed => StepError::Fatal(e.to_string()),
        }
    }
}

impl From<hopline_core::error::Error> for StepError {
    fn from(e: hopline_core::error::Error) -> Self {
        match e {
            hopline_core::error::Error::Conversion { .. } => StepError::Data(e.to_string()),
            other => StepError::Fatal(other.to_string()),
        }
    }
}

/// What one `process_batch` call reports back to the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// More work may follow; call again.
    Continue,
    /// Inputs are exhausted and all output has been written.
    Finished,
}

/// Everything a step may look at during `init`.
pub struct StepContext<'a> {
    pub meta: &'a StepMeta,
    pub copy: usize,
    /// Upstream step name of each input channel, in input-index order.
    pub input_steps: &'a [String],
    /// Target step name of each output hop, in output-index order.
    pub output_steps: &'a [String],
    pub config: &'a EngineConfig,
}

impl StepContext<'_> {
    pub fn step_name(&self) -> &str {
        &self.meta.name
    }

    /// Deserialize the step's JSON configuration; a missing (`null`) config
    /// yields `T::default()`.
    pub fn parse_config<T: DeserializeOwned + Default>(&self) -> Result<T, StepError> {
        if self.meta.config.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.meta.config.clone())
            .map_err(|e| StepError::Config(format!("step '{}': {e}", self.meta.name)))
    }

    /// Index of the output hop going to `step`.
    pub fn output_index(&self, step: &str) -> Result<usize, StepError> {
        self.output_steps
            .iter()
            .position(|s| s == step)
            .ok_or_else(|| {
                StepError::Config(format!(
                    "step '{}' has no output hop to '{step}'",
                    self.meta.name
                ))
            })
    }
}

/// Trait that every step type implements.
///
/// Invariants:
/// - `init` runs on the preparing thread; `process_batch` and `dispose` run on
///   the unit's own thread, hence `Send`.
/// - A step must not hold on to a row after writing it.
pub trait StepLogic: Send {
    /// Validate configuration and resolve anything that depends on the wiring.
    fn init(&mut self, ctx: &StepContext<'_>) -> Result<(), StepError>;

    /// Move up to `io.batch_rows()` rows from inputs to outputs.
    fn process_batch(&mut self, io: &mut StepIo) -> Result<BatchOutcome, StepError>;

    /// Release resources. Called exactly once, after the run loop ends.
    fn dispose(&mut self) {}
}
