//! YAML graph files.
//!
//! Example:
//! ```yaml
//! name: append_demo
//! config:
//!   channel_capacity: 100
//! steps:
//!   - { name: gen1, type: generate_rows,
//!       config: { limit: 3, fields: [ {name: code, type: String, value: KETTLE1} ] } }
//!   - { name: gen2, type: generate_rows,
//!       config: { limit: 3, fields: [ {name: code, type: String, value: KETTLE2} ] } }
//!   - { name: append, type: append }
//!   - { name: out, type: dummy }
//! hops:
//!   - { from: gen1, to: append }
//!   - { from: gen2, to: append }
//!   - { from: append, to: out }
//! ```
//!
//! Step `config` blocks are kept as opaque JSON values and parsed by each step
//! type during init.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hopline_core::config::EngineConfig;
use hopline_core::graph::{HopMeta, StepMeta, TransGraph};

#[derive(Debug, Error)]
pub enum DslError {
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid graph file: {0}")]
    Invalid(String),
}

/// Engine settings a graph file may pin. Unset keys leave the base config alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub channel_capacity: Option<usize>,
    pub safe_mode: Option<bool>,
    pub thread_prefix: Option<String>,
    pub batch_rows: Option<usize>,
}

impl ConfigOverrides {
    pub fn apply_to(&self, cfg: &mut EngineConfig) {
        if let Some(v) = self.channel_capacity {
            cfg.channel_capacity = v;
        }
        if let Some(v) = self.safe_mode {
            cfg.safe_mode = v;
        }
        if let Some(v) = &self.thread_prefix {
            cfg.thread_prefix = v.clone();
        }
        if let Some(v) = self.batch_rows {
            cfg.batch_rows = v;
        }
    }

    /// `self` with every key set in `other` replaced.
    pub fn merged(mut self, other: &ConfigOverrides) -> Self {
        if other.channel_capacity.is_some() {
            self.channel_capacity = other.channel_capacity;
        }
        if other.safe_mode.is_some() {
            self.safe_mode = other.safe_mode;
        }
        if other.thread_prefix.is_some() {
            self.thread_prefix = other.thread_prefix.clone();
        }
        if other.batch_rows.is_some() {
            self.batch_rows = other.batch_rows;
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct GraphFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    config: Option<ConfigOverrides>,
    steps: Vec<StepMeta>,
    #[serde(default)]
    hops: Vec<HopMeta>,
}

#[derive(Debug, Clone)]
pub struct ParsedGraph {
    pub graph: TransGraph,
    pub config: ConfigOverrides,
}

impl ParsedGraph {
    /// Environment defaults with the file's `config:` block applied.
    pub fn engine_config(&self) -> EngineConfig {
        let mut cfg = EngineConfig::from_env();
        self.config.apply_to(&mut cfg);
        cfg
    }
}

/// Parse a YAML graph file. Only the file format is checked here; structural
/// checks live in `validate`.
pub fn parse_yaml_graph(yaml_src: &str) -> Result<ParsedGraph, DslError> {
    let doc: GraphFile = serde_yaml::from_str(yaml_src)?;
    if doc.steps.is_empty() {
        return Err(DslError::Invalid("no steps".into()));
    }

    let mut graph = TransGraph::new(doc.name.unwrap_or_else(|| "unnamed".to_string()));
    for step in doc.steps {
        graph.add_step(step);
    }
    for hop in doc.hops {
        graph.add_hop(hop);
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(graph = %graph.name, steps = graph.steps.len(), hops = graph.hops.len(), "parsed graph file");

    Ok(ParsedGraph {
        graph,
        config: doc.config.unwrap_or_default(),
    })
}
