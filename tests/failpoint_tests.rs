//! Panic injection through failpoints. Run with `--features failpoints`.
#![cfg(feature = "failpoints")]

use hopline::exec::{RuntimeContext, StepState, Transformation};
use hopline::prelude::*;
use serde_json::json;

#[test]
fn test_injected_panic_errors_unit_and_stops_run() {
    std::env::set_var("HOPLINE_FAILPOINTS", "process_batch.boom");

    let mut g = TransGraph::new("failpoint");
    g.add_step(StepMeta::new("gen", "generate_rows").with_config(json!({
        "fields": [{"name": "n", "type": "Integer", "value": 1}]
    })))
    .add_step(StepMeta::new("boom", "dummy"))
    .add_hop(HopMeta::new("gen", "boom"));

    let result = Transformation::execute(g, RuntimeContext::default()).unwrap();
    std::env::remove_var("HOPLINE_FAILPOINTS");

    assert!(!result.success);
    let boom = result.unit("boom", 0).unwrap();
    assert_eq!(boom.state, StepState::Errored);
    assert!(boom.messages[0].contains("failpoint"));
    assert_eq!(result.unit("gen", 0).unwrap().state, StepState::Stopped);
}
