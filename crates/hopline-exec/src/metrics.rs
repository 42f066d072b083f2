//! Run summaries as tracing events.
//!
//! No telemetry stack here; a binary installs a subscriber and decides where
//! these go.

use crate::report::RunResult;

#[cfg(feature = "tracing")]
pub fn emit_run_summary(result: &RunResult) {
    let span = tracing::info_span!("hopline_run", graph = %result.manifest.graph_name, id = ?result.manifest.id);
    let _enter = span.enter();
    for u in &result.units {
        tracing::info!(
            unit = %u.unit,
            state = %u.state,
            read = u.lines_read,
            written = u.lines_written,
            errors = u.errors,
            "unit summary"
        );
    }
    for c in &result.channels {
        tracing::debug!(
            from = %c.from,
            to = %c.to,
            rows = c.rows_taken,
            peak = c.peak_depth,
            capacity = c.capacity,
            "channel summary"
        );
    }
    tracing::info!(
        success = result.success,
        errors = result.error_count(),
        duration_ms = result.manifest.duration_ms(),
        "run finished"
    );
}

#[cfg(not(feature = "tracing"))]
pub fn emit_run_summary(_result: &RunResult) {}
