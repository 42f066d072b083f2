//! Convenient re-exports for downstream crates.

pub use crate::config::EngineConfig;
pub use crate::error::Error;
pub use crate::graph::{DataErrorPolicy, HopMeta, StepMeta, TransGraph};
pub use crate::id::{ChannelId, UnitId};
pub use crate::manifest::{ManifestId, RunManifest};
pub use crate::schema::{DataType, RowSchema, ValueMeta};
pub use crate::types::{Row, Value};
