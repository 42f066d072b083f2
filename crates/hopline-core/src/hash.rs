//! Stable hashing of graphs for run manifests.

use blake3::Hasher;
use serde::Serialize;

use crate::error::Error;
use crate::graph::TransGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut h = Hasher::new();
    h.update(bytes);
    Hash256(h.finalize().into())
}

/// Hash any serde-serializable value deterministically (via JSON).
pub fn hash_serde<T: Serialize>(v: &T) -> Result<Hash256, Error> {
    let bytes = serde_json::to_vec(v)?;
    Ok(hash_bytes(&bytes))
}

/// Digest of the runnable part of a graph: steps plus *enabled* hops.
///
/// Toggling a disabled hop or renaming the graph does not change the digest.
pub fn hash_graph(graph: &TransGraph) -> Result<Hash256, Error> {
    let hops: Vec<_> = graph.enabled_hops().collect();
    hash_serde(&(&graph.steps, hops))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{HopMeta, StepMeta};

    #[test]
    fn graph_hash_ignores_name_and_disabled_hops() {
        let mut a = TransGraph::new("one");
        a.add_step(StepMeta::new("x", "dummy"))
            .add_step(StepMeta::new("y", "dummy"))
            .add_hop(HopMeta::new("x", "y"));

        let mut b = a.clone();
        b.name = "two".into();
        b.add_hop(HopMeta::new("y", "x").disabled());

        assert_eq!(hash_graph(&a).unwrap(), hash_graph(&b).unwrap());

        b.add_hop(HopMeta::new("y", "x"));
        assert_ne!(hash_graph(&a).unwrap(), hash_graph(&b).unwrap());
        assert_eq!(hash_graph(&a).unwrap().to_hex().len(), 64);
    }
}
