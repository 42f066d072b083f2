//! The static step/hop graph a run is instantiated from.
//!
//! This is metadata only: the exec crate turns it into channels and threads.
//! Step configuration is kept as an opaque JSON value; each step type parses
//! its own keys during `init`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What a step does when a single row fails to process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataErrorPolicy {
    /// Count the error, drop the row, keep going.
    Skip,
    /// Count the error and fail the unit.
    #[default]
    Abort,
}

fn default_copies() -> usize {
    1
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMeta {
    pub name: String,
    /// Registry key of the step implementation.
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default = "default_copies")]
    pub copies: usize,
    #[serde(default)]
    pub config: serde_json::Value,
    /// Round-robin rows across output hops instead of copying to each.
    #[serde(default)]
    pub distribute: bool,
    #[serde(default)]
    pub on_data_error: DataErrorPolicy,
}

impl StepMeta {
    pub fn new(name: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            step_type: step_type.into(),
            copies: 1,
            config: serde_json::Value::Null,
            distribute: false,
            on_data_error: DataErrorPolicy::default(),
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_copies(mut self, copies: usize) -> Self {
        self.copies = copies;
        self
    }

    pub fn with_distribute(mut self, distribute: bool) -> Self {
        self.distribute = distribute;
        self
    }

    pub fn with_error_policy(mut self, policy: DataErrorPolicy) -> Self {
        self.on_data_error = policy;
        self
    }
}

/// A directed edge between two steps. Disabled hops carry no rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopMeta {
    pub from: String,
    pub to: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl HopMeta {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransGraph {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepMeta>,
    #[serde(default)]
    pub hops: Vec<HopMeta>,
}

impl TransGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: vec![],
            hops: vec![],
        }
    }

    pub fn add_step(&mut self, step: StepMeta) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn add_hop(&mut self, hop: HopMeta) -> &mut Self {
        self.hops.push(hop);
        self
    }

    pub fn step(&self, name: &str) -> Option<&StepMeta> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_or_err(&self, name: &str) -> Result<&StepMeta> {
        self.step(name)
            .ok_or_else(|| Error::Graph(format!("unknown step '{name}'")))
    }

    /// Enabled hops ending at `step`, in declared order.
    pub fn input_hops<'a>(&'a self, step: &'a str) -> impl Iterator<Item = &'a HopMeta> + 'a {
        self.hops.iter().filter(move |h| h.enabled && h.to == step)
    }

    /// Enabled hops starting at `step`, in declared order.
    pub fn output_hops<'a>(&'a self, step: &'a str) -> impl Iterator<Item = &'a HopMeta> + 'a {
        self.hops.iter().filter(move |h| h.enabled && h.from == step)
    }

    pub fn enabled_hops(&self) -> impl Iterator<Item = &HopMeta> {
        self.hops.iter().filter(|h| h.enabled)
    }
}
