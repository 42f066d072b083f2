//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rows a channel buffers before `put` blocks. Fixed per channel at creation.
    pub channel_capacity: usize,

    /// Verify every row a unit writes has the layout of its first written row.
    pub safe_mode: bool,

    /// Prefix for unit thread names (`{prefix}{step}.{copy}`).
    pub thread_prefix: String,

    /// Upper bound on rows a step moves per `process_batch` call.
    pub batch_rows: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 10_000,
            safe_mode: false,
            thread_prefix: "hopline-".to_string(),
            batch_rows: 64,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `HOPLINE_CHANNEL_CAPACITY`: rows buffered per channel
    /// - `HOPLINE_SAFE_MODE`: `1`/`true` to enable row layout checks
    /// - `HOPLINE_THREAD_PREFIX`: thread name prefix
    /// - `HOPLINE_BATCH_ROWS`: rows per `process_batch` call
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("HOPLINE_CHANNEL_CAPACITY") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.channel_capacity = v;
            }
        }

        if let Ok(s) = std::env::var("HOPLINE_SAFE_MODE") {
            cfg.safe_mode = matches!(s.trim(), "1" | "true" | "TRUE" | "yes" | "Y");
        }

        if let Ok(s) = std::env::var("HOPLINE_THREAD_PREFIX") {
            cfg.thread_prefix = s;
        }

        if let Ok(s) = std::env::var("HOPLINE_BATCH_ROWS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.batch_rows = v;
            }
        }

        cfg
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.channel_capacity == 0 {
            return Err(crate::error::Error::Config(
                "channel_capacity must be at least 1".into(),
            ));
        }
        if self.batch_rows == 0 {
            return Err(crate::error::Error::Config(
                "batch_rows must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
