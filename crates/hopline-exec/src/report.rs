//! What a finished run reports back.

use serde::{Deserialize, Serialize};

use hopline_core::id::{ChannelId, UnitId};
use hopline_core::manifest::RunManifest;

use crate::runtime::ExecError;
use crate::step::StepState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    pub unit: UnitId,
    /// FINISHED, STOPPED or ERRORED (or an earlier state if it never ran).
    pub state: StepState,
    pub lines_read: u64,
    pub lines_written: u64,
    pub errors: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelReport {
    pub id: ChannelId,
    /// Producing unit, or `producer` for a row producer handle.
    pub from: String,
    pub to: UnitId,
    pub capacity: usize,
    pub rows_put: u64,
    pub rows_taken: u64,
    pub peak_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Every unit ended FINISHED. Skipped data errors are counted in `units`
    /// but do not fail the run.
    pub success: bool,
    pub units: Vec<UnitReport>,
    pub channels: Vec<ChannelReport>,
    pub manifest: RunManifest,
}

impl RunResult {
    pub fn error_count(&self) -> u64 {
        self.units.iter().map(|u| u.errors).sum()
    }

    /// Every recorded error message, tagged with its unit.
    pub fn errors(&self) -> Vec<(UnitId, String)> {
        self.units
            .iter()
            .flat_map(|u| u.messages.iter().map(move |m| (u.unit.clone(), m.clone())))
            .collect()
    }

    pub fn unit(&self, step: &str, copy: usize) -> Option<&UnitReport> {
        self.units
            .iter()
            .find(|u| u.unit.step == step && u.unit.copy == copy)
    }

    /// `Err(ExecError::Failed)` unless the run succeeded.
    pub fn into_result(self) -> Result<RunResult, ExecError> {
        if self.success {
            return Ok(self);
        }
        let summary = self
            .errors()
            .into_iter()
            .map(|(u, m)| format!("{u}: {m}"))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ExecError::Failed {
            errors: self.error_count(),
            summary,
        })
    }
}
