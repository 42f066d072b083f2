//! Graph validation against a step registry.
//!
//! Everything a run could reject before any thread starts is checked here:
//! names, step types, hop endpoints, input arity, copy counts and cycles.

use std::collections::HashSet;
use std::fmt::Write as _;

use thiserror::Error;

use hopline_core::graph::TransGraph;
use hopline_steps::StepRegistry;

use crate::topology::{topological_order, Topology};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("graph has no steps")]
    Empty,

    #[error("step with empty name")]
    EmptyName,

    #[error("duplicate step name '{0}'")]
    DuplicateStep(String),

    #[error("step '{step}' has unregistered type '{step_type}'")]
    UnknownStepType { step: String, step_type: String },

    #[error("hop {from} -> {to} references unknown step '{missing}'")]
    UnknownHopStep {
        from: String,
        to: String,
        missing: String,
    },

    #[error("duplicate hop {from} -> {to}")]
    DuplicateHop { from: String, to: String },

    #[error("step '{step}' ({step_type}) needs at least {min} input hop(s), has {actual}")]
    TooFewInputs {
        step: String,
        step_type: String,
        min: usize,
        actual: usize,
    },

    #[error("step '{step}' ({step_type}) accepts at most {max} input hop(s), has {actual}")]
    TooManyInputs {
        step: String,
        step_type: String,
        max: usize,
        actual: usize,
    },

    #[error("step '{0}' must run at least one copy")]
    InvalidCopies(String),

    #[error("hops form a cycle through: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// A graph that passed validation, with its step order.
#[derive(Debug, Clone)]
pub struct GraphPlan {
    pub topology: Topology,
    /// Steps without enabled input hops.
    pub sources: Vec<String>,
    /// Steps without enabled output hops.
    pub sinks: Vec<String>,
}

impl GraphPlan {
    /// Human-readable outline of the graph, one step per line in run order.
    pub fn explain(&self, graph: &TransGraph) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "graph '{}': {} step(s), {} enabled hop(s), depth {}",
            graph.name,
            graph.steps.len(),
            graph.enabled_hops().count(),
            self.topology.depth()
        );
        for name in &self.topology.order {
            let Some(step) = graph.step(name) else {
                continue;
            };
            let inputs: Vec<&str> = graph.input_hops(name).map(|h| h.from.as_str()).collect();
            let mut line = format!(
                "{:indent$}{} [{}] x{}",
                "",
                step.name,
                step.step_type,
                step.copies,
                indent = 2 * self.topology.level(name)
            );
            if step.distribute {
                line.push_str(" distribute");
            }
            if !inputs.is_empty() {
                let _ = write!(line, " <- {}", inputs.join(", "));
            }
            let _ = writeln!(out, "{line}");
        }
        out
    }
}

/// Validate `graph` against `registry`.
///
/// Errors are reported one at a time, in the order the checks above are
/// listed, so the first structural problem wins.
pub fn validate(graph: &TransGraph, registry: &StepRegistry) -> Result<GraphPlan, ValidationError> {
    if graph.steps.is_empty() {
        return Err(ValidationError::Empty);
    }

    let mut names = HashSet::new();
    for step in &graph.steps {
        if step.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if !names.insert(step.name.as_str()) {
            return Err(ValidationError::DuplicateStep(step.name.clone()));
        }
        if !registry.contains(&step.step_type) {
            return Err(ValidationError::UnknownStepType {
                step: step.name.clone(),
                step_type: step.step_type.clone(),
            });
        }
        if step.copies == 0 {
            return Err(ValidationError::InvalidCopies(step.name.clone()));
        }
    }

    let mut seen_hops = HashSet::new();
    for hop in graph.enabled_hops() {
        for end in [&hop.from, &hop.to] {
            if !names.contains(end.as_str()) {
                return Err(ValidationError::UnknownHopStep {
                    from: hop.from.clone(),
                    to: hop.to.clone(),
                    missing: end.clone(),
                });
            }
        }
        if !seen_hops.insert((hop.from.as_str(), hop.to.as_str())) {
            return Err(ValidationError::DuplicateHop {
                from: hop.from.clone(),
                to: hop.to.clone(),
            });
        }
    }

    for step in &graph.steps {
        let Some(decl) = registry.decl(&step.step_type) else {
            continue;
        };
        let actual = graph.input_hops(&step.name).count();
        if actual < decl.min_inputs {
            return Err(ValidationError::TooFewInputs {
                step: step.name.clone(),
                step_type: step.step_type.clone(),
                min: decl.min_inputs,
                actual,
            });
        }
        if let Some(max) = decl.max_inputs {
            if actual > max {
                return Err(ValidationError::TooManyInputs {
                    step: step.name.clone(),
                    step_type: step.step_type.clone(),
                    max,
                    actual,
                });
            }
        }
    }

    let topology = topological_order(graph).map_err(ValidationError::Cycle)?;

    let sources = graph
        .steps
        .iter()
        .filter(|s| graph.input_hops(&s.name).next().is_none())
        .map(|s| s.name.clone())
        .collect();
    let sinks = graph
        .steps
        .iter()
        .filter(|s| graph.output_hops(&s.name).next().is_none())
        .map(|s| s.name.clone())
        .collect();

    #[cfg(feature = "tracing")]
    tracing::debug!(
        graph = %graph.name,
        steps = graph.steps.len(),
        depth = topology.depth(),
        "graph validated"
    );

    Ok(GraphPlan {
        topology,
        sources,
        sinks,
    })
}
