//! Run manifest: what ran, with which engine, and when.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: ManifestId,

    /// Name of the graph that ran.
    pub graph_name: String,

    /// Stable hash of the steps and enabled hops.
    pub graph_hash: Hash256,

    /// Engine version string for provenance.
    pub engine_version: String,

    /// Number of step-copies and channels instantiated.
    pub units: usize,
    pub channels: usize,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl RunManifest {
    pub fn new(graph_name: impl Into<String>, graph_hash: Hash256, started_ms: u64) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            graph_name: graph_name.into(),
            graph_hash,
            engine_version: crate::VERSION.to_string(),
            units: 0,
            channels: 0,
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn with_topology(mut self, units: usize, channels: usize) -> Self {
        self.units = units;
        self.channels = channels;
        self
    }

    pub fn finish(mut self, finished_ms: u64) -> Self {
        self.finished_ms = finished_ms.max(self.started_ms);
        self
    }

    pub fn duration_ms(&self) -> u64 {
        self.finished_ms - self.started_ms
    }
}
