//! Topological ordering of steps over enabled hops.
//!
//! Kahn's algorithm: steps become ready once all their upstream steps have
//! been emitted. Ties are broken by declaration order so the result is stable
//! for a given graph. Steps never emitted sit on (or behind) a cycle.

use std::collections::{HashMap, VecDeque};

use hopline_core::graph::TransGraph;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Step names, upstream before downstream.
    pub order: Vec<String>,
    /// Longest hop distance from any source step.
    pub levels: HashMap<String, usize>,
}

impl Topology {
    pub fn level(&self, step: &str) -> usize {
        self.levels.get(step).copied().unwrap_or(0)
    }

    /// Number of distinct levels (pipeline depth).
    pub fn depth(&self) -> usize {
        self.levels.values().max().map_or(0, |l| l + 1)
    }
}

/// Order the graph's steps. Hops naming unknown steps are ignored here.
///
/// On a cycle, returns the names of the steps that could not be ordered,
/// in declaration order.
pub fn topological_order(graph: &TransGraph) -> Result<Topology, Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = graph
        .steps
        .iter()
        .map(|s| (s.name.as_str(), 0))
        .collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for hop in graph.enabled_hops() {
        if !in_degree.contains_key(hop.from.as_str()) || !in_degree.contains_key(hop.to.as_str()) {
            continue;
        }
        *in_degree.entry(hop.to.as_str()).or_default() += 1;
        dependents
            .entry(hop.from.as_str())
            .or_default()
            .push(hop.to.as_str());
    }

    let mut ready: VecDeque<&str> = graph
        .steps
        .iter()
        .map(|s| s.name.as_str())
        .filter(|n| in_degree.get(n) == Some(&0))
        .collect();

    let mut order = Vec::with_capacity(graph.steps.len());
    let mut levels: HashMap<String, usize> = HashMap::new();

    while let Some(step) = ready.pop_front() {
        let level = levels.get(step).copied().unwrap_or(0);
        levels.insert(step.to_string(), level);
        order.push(step.to_string());

        if let Some(nexts) = dependents.get(step) {
            for &v in nexts {
                let l = levels.entry(v.to_string()).or_insert(0);
                *l = (*l).max(level + 1);
                if let Some(deg) = in_degree.get_mut(v) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push_back(v);
                    }
                }
            }
        }
    }

    if order.len() < graph.steps.len() {
        let stuck = graph
            .steps
            .iter()
            .filter(|s| in_degree.get(s.name.as_str()).is_some_and(|&d| d > 0))
            .map(|s| s.name.clone())
            .collect();
        return Err(stuck);
    }

    Ok(Topology { order, levels })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopline_core::graph::{HopMeta, StepMeta};

    fn graph(steps: &[&str], hops: &[(&str, &str)]) -> TransGraph {
        let mut g = TransGraph::new("t");
        for s in steps {
            g.add_step(StepMeta::new(*s, "dummy"));
        }
        for (a, b) in hops {
            g.add_hop(HopMeta::new(*a, *b));
        }
        g
    }

    #[test]
    fn diamond_orders_upstream_first() {
        let g = graph(
            &["sink", "left", "src", "right"],
            &[("src", "left"), ("src", "right"), ("left", "sink"), ("right", "sink")],
        );
        let t = topological_order(&g).unwrap();
        assert_eq!(t.order, vec!["src", "left", "right", "sink"]);
        assert_eq!(t.level("sink"), 2);
        assert_eq!(t.depth(), 3);
    }

    #[test]
    fn cycle_reports_stuck_steps() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "b")]);
        assert_eq!(topological_order(&g).unwrap_err(), vec!["b", "c"]);
    }

    #[test]
    fn disabled_hop_breaks_cycle() {
        let mut g = graph(&["a", "b"], &[("a", "b")]);
        g.add_hop(HopMeta::new("b", "a").disabled());
        assert_eq!(topological_order(&g).unwrap().order, vec!["a", "b"]);
    }
}
