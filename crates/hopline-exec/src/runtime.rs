//! Runtime: one `Transformation` per run.
//!
//! Lifecycle:
//! - `prepare_execution` validates the graph, allocates one channel per enabled
//!   hop and copy pair, creates one unit per step-copy and calls `init` on
//!   every step. Any failure here means no thread is ever started.
//! - `add_row_producer` / `add_row_observer` attach external handles.
//! - `start_threads` spawns one OS thread per unit.
//! - `wait_until_finished` joins every thread and aggregates the result.
//!
//! A run object is single-use; calling an operation out of order is an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use hopline_channel::{ChannelError, RowChannel, Wakeup};
use hopline_core::config::EngineConfig;
use hopline_core::graph::TransGraph;
use hopline_core::hash::{hash_graph, Hash256};
use hopline_core::id::{ChannelId, UnitId};
use hopline_core::manifest::RunManifest;
use hopline_planner::{validate, GraphPlan, ValidationError};
use hopline_steps::{RowListener, StepContext, StepError, StepIo, StepLogic, StepRegistry};

use crate::metrics::emit_run_summary;
use crate::producer::RowProducer;
use crate::report::{ChannelReport, RunResult, UnitReport};
use crate::scheduler::{join_all, spawn_unit, RunControl, StopHandle};
use crate::step::{StepState, StepUnit, UnitShared};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid graph: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Core(#[from] hopline_core::error::Error),

    #[error("step {unit} failed to initialize: {source}")]
    Init { unit: UnitId, source: StepError },

    #[error("cannot {op} while the run is {phase}")]
    InvalidState { op: &'static str, phase: RunPhase },

    #[error("no step-copy {0} in this run")]
    UnknownUnit(UnitId),

    #[error("step '{0}' has an upstream hop; rows cannot be injected into it")]
    HasUpstream(String),

    #[error("step '{step}' of type '{step_type}' reads no input; rows cannot be injected into it")]
    TakesNoInput { step: String, step_type: String },

    #[error("channel: {0}")]
    Channel(#[from] ChannelError),

    #[error("failed to start thread for {unit}: {reason}")]
    Spawn { unit: UnitId, reason: String },

    #[error("run failed with {errors} error(s): {summary}")]
    Failed { errors: u64, summary: String },
}

/// Where a `Transformation` is in its single-use lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    New,
    Prepared,
    Running,
    Finished,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::New => "new",
            RunPhase::Prepared => "prepared",
            RunPhase::Running => "running",
            RunPhase::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// What a run is executed with: engine settings and the step types it may use.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub config: EngineConfig,
    pub registry: Arc<StepRegistry>,
}

impl RuntimeContext {
    pub fn new(config: EngineConfig, registry: Arc<StepRegistry>) -> Self {
        Self { config, registry }
    }

    /// Built-in step types with `EngineConfig::from_env()`.
    pub fn from_env() -> Self {
        Self::new(
            EngineConfig::from_env(),
            Arc::new(StepRegistry::with_builtins()),
        )
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new(
            EngineConfig::default(),
            Arc::new(StepRegistry::with_builtins()),
        )
    }
}

/// A unit between `prepare_execution` and `start_threads`.
struct PendingUnit {
    logic: Option<Box<dyn StepLogic>>,
    io: StepIo,
    shared: Arc<UnitShared>,
    /// Upstream step of each input channel.
    input_steps: Vec<String>,
    /// Target step of each output hop.
    output_steps: Vec<String>,
}

struct ChannelInfo {
    channel: Arc<RowChannel>,
    from: String,
    to: UnitId,
}

pub struct Transformation {
    graph: TransGraph,
    ctx: RuntimeContext,
    phase: RunPhase,
    plan: Option<GraphPlan>,
    units: Vec<PendingUnit>,
    index: HashMap<UnitId, usize>,
    shared: Vec<Arc<UnitShared>>,
    channels: Vec<ChannelInfo>,
    next_channel: u64,
    handles: Vec<(UnitId, JoinHandle<()>)>,
    control: Arc<RunControl>,
    manifest: Option<RunManifest>,
    result: Option<RunResult>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn slot(index: &HashMap<UnitId, usize>, id: &UnitId) -> Result<usize, ExecError> {
    index
        .get(id)
        .copied()
        .ok_or_else(|| ExecError::UnknownUnit(id.clone()))
}

/// Dispose every initialized logic that never got a thread.
fn dispose_pending(units: &mut [PendingUnit]) {
    for u in units {
        if let Some(mut logic) = u.logic.take() {
            logic.dispose();
            u.shared.advance(StepState::Disposed);
        }
    }
}

/// New channel whose consumer is woken through `consumer`.
fn alloc_channel(
    control: &RunControl,
    next: &mut u64,
    capacity: usize,
    consumer: &Arc<Wakeup>,
) -> Arc<RowChannel> {
    let id = ChannelId::new(*next);
    *next += 1;
    let ch = Arc::new(RowChannel::with_wakeup(id, capacity, Arc::clone(consumer)));
    control.register_channel(Arc::clone(&ch));
    ch
}

impl Transformation {
    pub fn new(graph: TransGraph, ctx: RuntimeContext) -> Self {
        Self {
            graph,
            ctx,
            phase: RunPhase::New,
            plan: None,
            units: vec![],
            index: HashMap::new(),
            shared: vec![],
            channels: vec![],
            next_channel: 0,
            handles: vec![],
            control: Arc::new(RunControl::new()),
            manifest: None,
            result: None,
        }
    }

    /// Prepare, start and wait in one call.
    pub fn execute(graph: TransGraph, ctx: RuntimeContext) -> Result<RunResult, ExecError> {
        let mut t = Self::new(graph, ctx);
        t.prepare_execution()?;
        t.start_threads()?;
        t.wait_until_finished()
    }

    pub fn graph(&self) -> &TransGraph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Validation output, once prepared.
    pub fn plan(&self) -> Option<&GraphPlan> {
        self.plan.as_ref()
    }

    /// Handle for stopping this run from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.control))
    }

    fn expect_phase(&self, op: &'static str, phase: RunPhase) -> Result<(), ExecError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(ExecError::InvalidState {
                op,
                phase: self.phase,
            })
        }
    }

    /// Validate, wire and initialize. On error the run is spent.
    pub fn prepare_execution(&mut self) -> Result<(), ExecError> {
        self.expect_phase("prepare", RunPhase::New)?;
        match self.prepare_inner() {
            Ok(()) => {
                self.phase = RunPhase::Prepared;
                Ok(())
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(graph = %self.graph.name, error = %e, "prepare failed");
                self.phase = RunPhase::Finished;
                Err(e)
            }
        }
    }

    fn prepare_inner(&mut self) -> Result<(), ExecError> {
        self.ctx.config.validate()?;
        let plan = validate(&self.graph, &self.ctx.registry)?;

        let graph = &self.graph;
        let config = &self.ctx.config;
        let control = &self.control;
        let mut next_channel = self.next_channel;

        let mut units: Vec<PendingUnit> = vec![];
        let mut index = HashMap::new();
        for name in &plan.topology.order {
            let meta = graph.step_or_err(name)?;
            for copy in 0..meta.copies {
                let id = UnitId::new(name.clone(), copy);
                let wakeup = Arc::new(Wakeup::new());
                control.register_wakeup(Arc::clone(&wakeup));
                let io = StepIo::new(id.clone(), wakeup, control.stop_flag())
                    .with_policy(meta.on_data_error)
                    .with_distribute(meta.distribute)
                    .with_batch_rows(config.batch_rows)
                    .with_safe_mode(config.safe_mode);
                let shared = Arc::new(UnitShared::new(id.clone(), Arc::clone(io.counters())));
                index.insert(id, units.len());
                units.push(PendingUnit {
                    logic: None,
                    io,
                    shared,
                    input_steps: vec![],
                    output_steps: vec![],
                });
            }
        }

        // Equal copy counts pair copies i -> i; otherwise every source copy
        // feeds every target copy and spreads its rows round-robin.
        let mut channels = vec![];
        for hop in graph.enabled_hops() {
            let src = graph.step_or_err(&hop.from)?;
            let dst = graph.step_or_err(&hop.to)?;
            for i in 0..src.copies {
                let from_id = UnitId::new(src.name.clone(), i);
                let targets: Vec<usize> = if src.copies == dst.copies {
                    vec![i]
                } else {
                    (0..dst.copies).collect()
                };
                let mut hop_channels = Vec::with_capacity(targets.len());
                for j in targets {
                    let to_id = UnitId::new(dst.name.clone(), j);
                    let t = slot(&index, &to_id)?;
                    let ch = alloc_channel(
                        control,
                        &mut next_channel,
                        config.channel_capacity,
                        units[t].io.wakeup(),
                    );
                    units[t].io.add_input(from_id.clone(), Arc::clone(&ch));
                    units[t].input_steps.push(src.name.clone());
                    channels.push(ChannelInfo {
                        channel: Arc::clone(&ch),
                        from: from_id.to_string(),
                        to: to_id,
                    });
                    hop_channels.push(ch);
                }
                let s = slot(&index, &from_id)?;
                units[s].io.add_output(dst.name.clone(), hop_channels);
                units[s].output_steps.push(dst.name.clone());
            }
        }

        // Init in topological order; the first failure disposes what was
        // already initialized.
        let mut failed = None;
        for unit in units.iter_mut() {
            let meta = graph.step_or_err(&unit.shared.id.step)?;
            let mut logic = self.ctx.registry.create(&meta.step_type).ok_or_else(|| {
                ValidationError::UnknownStepType {
                    step: meta.name.clone(),
                    step_type: meta.step_type.clone(),
                }
            })?;
            let ctx = StepContext {
                meta,
                copy: unit.shared.id.copy,
                input_steps: &unit.input_steps,
                output_steps: &unit.output_steps,
                config,
            };
            match logic.init(&ctx) {
                Ok(()) => {
                    unit.shared.advance(StepState::Initialized);
                    unit.logic = Some(logic);
                }
                Err(e) => {
                    unit.shared.counters.record_error(e.to_string());
                    failed = Some((unit.shared.id.clone(), e));
                    break;
                }
            }
        }
        if let Some((id, source)) = failed {
            dispose_pending(&mut units);
            self.shared = units.iter().map(|u| Arc::clone(&u.shared)).collect();
            return Err(ExecError::Init { unit: id, source });
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            graph = %graph.name,
            units = units.len(),
            channels = channels.len(),
            "prepared run"
        );

        self.shared = units.iter().map(|u| Arc::clone(&u.shared)).collect();
        self.units = units;
        self.index = index;
        self.channels = channels;
        self.next_channel = next_channel;
        self.plan = Some(plan);
        Ok(())
    }

    /// Attach an external producer to a step-copy that has no upstream hop.
    pub fn add_row_producer(&mut self, step: &str, copy: usize) -> Result<RowProducer, ExecError> {
        self.expect_phase("add a row producer", RunPhase::Prepared)?;
        let id = UnitId::new(step, copy);
        let k = slot(&self.index, &id)?;
        if self.graph.input_hops(step).next().is_some() {
            return Err(ExecError::HasUpstream(step.to_string()));
        }
        let meta = self.graph.step_or_err(step)?;
        if self
            .ctx
            .registry
            .decl(&meta.step_type)
            .is_some_and(|d| d.max_inputs == Some(0))
        {
            return Err(ExecError::TakesNoInput {
                step: step.to_string(),
                step_type: meta.step_type.clone(),
            });
        }

        let wakeup = Arc::clone(self.units[k].io.wakeup());
        let ch = alloc_channel(
            &self.control,
            &mut self.next_channel,
            self.ctx.config.channel_capacity,
            &wakeup,
        );
        let unit = &mut self.units[k];
        let source = UnitId::new("producer", unit.io.input_count());
        unit.io.add_input(source, Arc::clone(&ch));
        self.channels.push(ChannelInfo {
            channel: Arc::clone(&ch),
            from: "producer".to_string(),
            to: id.clone(),
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(unit = %id, "row producer attached");
        Ok(RowProducer::new(id, ch))
    }

    /// Register `listener` for every row `step.copy` reads or writes.
    pub fn add_row_observer(
        &mut self,
        step: &str,
        copy: usize,
        listener: Arc<dyn RowListener>,
    ) -> Result<(), ExecError> {
        self.expect_phase("add a row observer", RunPhase::Prepared)?;
        let k = slot(&self.index, &UnitId::new(step, copy))?;
        self.units[k].io.add_listener(listener);
        Ok(())
    }

    /// Spawn one thread per unit.
    pub fn start_threads(&mut self) -> Result<(), ExecError> {
        self.expect_phase("start threads", RunPhase::Prepared)?;
        let manifest = RunManifest::new(
            self.graph.name.clone(),
            hash_graph(&self.graph)?,
            now_millis(),
        )
        .with_topology(self.shared.len(), self.channels.len());
        self.manifest = Some(manifest);
        self.phase = RunPhase::Running;

        let prefix = self.ctx.config.thread_prefix.clone();
        let mut spawn_error = None;
        for pending in std::mem::take(&mut self.units) {
            let PendingUnit {
                logic, io, shared, ..
            } = pending;
            let Some(logic) = logic else {
                continue;
            };
            let id = shared.id.clone();
            let unit = StepUnit::new(logic, io, Arc::clone(&shared), Arc::clone(&self.control));
            match spawn_unit(&prefix, &id, unit) {
                Ok(h) => self.handles.push((id, h)),
                Err(e) => {
                    // The unit was dropped with the closure, which disposed it.
                    shared
                        .counters
                        .record_error(format!("thread spawn failed: {e}"));
                    self.control.stop_all();
                    spawn_error.get_or_insert(ExecError::Spawn {
                        unit: id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(graph = %self.graph.name, threads = self.handles.len(), "run started");

        match spawn_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Abort every channel and ask every unit to stop. Idempotent.
    pub fn stop_all(&self) {
        self.control.stop_all();
    }

    /// Block until every unit thread has ended, then report.
    ///
    /// There is no timeout; use a `StopHandle` from another thread to bound
    /// the wait.
    pub fn wait_until_finished(&mut self) -> Result<RunResult, ExecError> {
        match self.phase {
            RunPhase::Running => {}
            RunPhase::Finished => {
                if let Some(r) = &self.result {
                    return Ok(r.clone());
                }
                return Err(ExecError::InvalidState {
                    op: "wait",
                    phase: self.phase,
                });
            }
            phase => return Err(ExecError::InvalidState { op: "wait", phase }),
        }

        for id in join_all(std::mem::take(&mut self.handles)) {
            if let Some(s) = self.shared.iter().find(|s| s.id == id) {
                s.counters.record_error("unit thread panicked");
            }
        }

        let result = self.build_result();
        emit_run_summary(&result);
        self.result = Some(result.clone());
        self.phase = RunPhase::Finished;
        Ok(result)
    }

    fn build_result(&mut self) -> RunResult {
        let units: Vec<UnitReport> = self
            .shared
            .iter()
            .map(|s| UnitReport {
                unit: s.id.clone(),
                state: s.outcome(),
                lines_read: s.counters.lines_read(),
                lines_written: s.counters.lines_written(),
                errors: s.counters.errors(),
                messages: s.counters.messages(),
            })
            .collect();
        let channels = self
            .channels
            .iter()
            .map(|c| {
                let stats = c.channel.stats().snapshot();
                ChannelReport {
                    id: c.channel.id(),
                    from: c.from.clone(),
                    to: c.to.clone(),
                    capacity: c.channel.capacity(),
                    rows_put: stats.rows_put,
                    rows_taken: stats.rows_taken,
                    peak_depth: stats.peak_depth,
                }
            })
            .collect();
        let success = units.iter().all(|u| u.state == StepState::Finished);
        let manifest = match self.manifest.take() {
            Some(m) => m.finish(now_millis()),
            None => RunManifest::new(self.graph.name.clone(), Hash256([0; 32]), now_millis()),
        };
        RunResult {
            success,
            units,
            channels,
            manifest,
        }
    }

    /// Sum of error counters over all units so far.
    pub fn error_count(&self) -> u64 {
        self.shared.iter().map(|s| s.counters.errors()).sum()
    }

    /// Recorded error messages so far, tagged with their unit.
    pub fn errors(&self) -> Vec<(UnitId, String)> {
        self.shared
            .iter()
            .flat_map(|s| {
                s.counters
                    .messages()
                    .into_iter()
                    .map(move |m| (s.id.clone(), m))
            })
            .collect()
    }

    pub fn unit_state(&self, step: &str, copy: usize) -> Option<StepState> {
        self.shared
            .iter()
            .find(|s| s.id.step == step && s.id.copy == copy)
            .map(|s| s.state())
    }

    /// Every unit has been disposed.
    pub fn is_finished(&self) -> bool {
        !self.shared.is_empty() && self.shared.iter().all(|s| s.state() == StepState::Disposed)
    }
}

impl Drop for Transformation {
    fn drop(&mut self) {
        // Prepared but never started.
        dispose_pending(&mut self.units);
        if self.handles.is_empty() {
            return;
        }
        // Never leave unit threads running past their run object.
        self.control.stop_all();
        join_all(std::mem::take(&mut self.handles));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::RowCollector;
    use hopline_core::graph::{DataErrorPolicy, HopMeta, StepMeta};
    use hopline_core::types::Value;
    use hopline_steps::{BatchOutcome, StepTypeDecl};
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn gen(name: &str, limit: Option<u64>) -> StepMeta {
        let mut cfg = json!({"fields": [{"name": "n", "type": "Integer", "value": 7}]});
        if let Some(l) = limit {
            cfg["limit"] = json!(l);
        }
        StepMeta::new(name, "generate_rows").with_config(cfg)
    }

    fn small_ctx() -> RuntimeContext {
        let config = EngineConfig {
            channel_capacity: 4,
            batch_rows: 3,
            ..Default::default()
        };
        RuntimeContext::new(config, Arc::new(StepRegistry::with_builtins()))
    }

    fn run_observed(graph: TransGraph, observe: &str, copy: usize) -> (RunResult, Arc<RowCollector>) {
        let mut t = Transformation::new(graph, small_ctx());
        t.prepare_execution().unwrap();
        let collector = Arc::new(RowCollector::new());
        t.add_row_observer(observe, copy, collector.clone()).unwrap();
        t.start_threads().unwrap();
        (t.wait_until_finished().unwrap(), collector)
    }

    #[test]
    fn linear_run_moves_every_row() {
        let mut g = TransGraph::new("linear");
        g.add_step(gen("gen", Some(25)))
            .add_step(StepMeta::new("out", "dummy"))
            .add_hop(HopMeta::new("gen", "out"));

        let (result, collector) = run_observed(g, "out", 0);
        assert!(result.success);
        assert_eq!(collector.written_count(), 25);
        assert_eq!(result.unit("out", 0).unwrap().lines_read, 25);
        assert_eq!(result.unit("gen", 0).unwrap().state, StepState::Finished);
        assert_eq!(result.manifest.units, 2);
        assert_eq!(result.channels.len(), 1);
        assert!(result.channels[0].peak_depth <= 4);
    }

    #[test]
    fn operations_out_of_order_are_rejected() {
        let mut g = TransGraph::new("t");
        g.add_step(gen("gen", Some(1)));
        let mut t = Transformation::new(g, small_ctx());

        assert!(matches!(
            t.start_threads(),
            Err(ExecError::InvalidState { phase: RunPhase::New, .. })
        ));
        assert!(matches!(t.wait_until_finished(), Err(ExecError::InvalidState { .. })));
        t.prepare_execution().unwrap();
        assert!(matches!(t.prepare_execution(), Err(ExecError::InvalidState { .. })));
        t.start_threads().unwrap();
        assert!(matches!(
            t.add_row_observer("gen", 0, Arc::new(RowCollector::new())),
            Err(ExecError::InvalidState { .. })
        ));
        let first = t.wait_until_finished().unwrap();
        let again = t.wait_until_finished().unwrap();
        assert_eq!(first.manifest.id, again.manifest.id);
        assert!(t.is_finished());
    }

    #[test]
    fn producer_rules() {
        let mut g = TransGraph::new("t");
        g.add_step(StepMeta::new("inj", "injector"))
            .add_step(StepMeta::new("out", "dummy"))
            .add_step(gen("gen", Some(1)))
            .add_hop(HopMeta::new("inj", "out"));
        let mut t = Transformation::new(g, small_ctx());
        t.prepare_execution().unwrap();

        assert!(matches!(t.add_row_producer("out", 0), Err(ExecError::HasUpstream(_))));
        assert!(matches!(
            t.add_row_producer("gen", 0),
            Err(ExecError::TakesNoInput { ref step_type, .. }) if step_type == "generate_rows"
        ));
        assert!(matches!(t.add_row_producer("inj", 1), Err(ExecError::UnknownUnit(_))));
        let p = t.add_row_producer("inj", 0).unwrap();
        assert_eq!(p.unit().to_string(), "inj.0");
    }

    #[test]
    fn init_failure_disposes_and_starts_nothing() {
        let mut g = TransGraph::new("t");
        g.add_step(gen("gen", Some(1)))
            .add_step(StepMeta::new("f", "filter_rows").with_config(json!({"condition": "???"})))
            .add_hop(HopMeta::new("gen", "f"));
        let mut t = Transformation::new(g, small_ctx());

        match t.prepare_execution() {
            Err(ExecError::Init { unit, source: StepError::Config(_) }) => {
                assert_eq!(unit, UnitId::new("f", 0))
            }
            other => panic!("expected init error, got {other:?}"),
        }
        assert_eq!(t.unit_state("gen", 0), Some(StepState::Disposed));
        assert_eq!(t.unit_state("f", 0), Some(StepState::Created));
        assert_eq!(t.error_count(), 1);
        assert!(matches!(t.start_threads(), Err(ExecError::InvalidState { .. })));
    }

    #[test]
    fn unregistered_type_fails_validation() {
        let mut g = TransGraph::new("t");
        g.add_step(StepMeta::new("sap", "sap_input"));
        let mut t = Transformation::new(g, small_ctx());
        assert!(matches!(
            t.prepare_execution(),
            Err(ExecError::Validation(ValidationError::UnknownStepType { .. }))
        ));
        assert!(t.unit_state("sap", 0).is_none());
    }

    #[test]
    fn copies_fan_out_and_back_in() {
        let mut g = TransGraph::new("copies");
        g.add_step(gen("gen", Some(10)))
            .add_step(StepMeta::new("work", "dummy").with_copies(3))
            .add_step(StepMeta::new("out", "dummy"))
            .add_hop(HopMeta::new("gen", "work"))
            .add_hop(HopMeta::new("work", "out"));

        let (result, collector) = run_observed(g, "out", 0);
        assert!(result.success);
        assert_eq!(collector.written_count(), 10);
        let per_copy: Vec<u64> = (0..3)
            .map(|c| result.unit("work", c).unwrap().lines_read)
            .collect();
        assert_eq!(per_copy, vec![4, 3, 3]);
    }

    #[test]
    fn equal_copies_pair_up() {
        let mut g = TransGraph::new("pairs");
        g.add_step(gen("gen", Some(5)).with_copies(2))
            .add_step(StepMeta::new("out", "dummy").with_copies(2))
            .add_hop(HopMeta::new("gen", "out"));

        let (result, _) = run_observed(g, "out", 1);
        assert_eq!(result.unit("out", 0).unwrap().lines_read, 5);
        assert_eq!(result.unit("out", 1).unwrap().lines_read, 5);
        assert_eq!(result.channels.len(), 2);
    }

    #[test]
    fn distribute_splits_rows_across_hops() {
        let mut g = TransGraph::new("dist");
        g.add_step(gen("gen", Some(6)).with_distribute(true))
            .add_step(StepMeta::new("a", "dummy"))
            .add_step(StepMeta::new("b", "dummy"))
            .add_hop(HopMeta::new("gen", "a"))
            .add_hop(HopMeta::new("gen", "b"));

        let (result, _) = run_observed(g, "a", 0);
        assert_eq!(result.unit("a", 0).unwrap().lines_read, 3);
        assert_eq!(result.unit("b", 0).unwrap().lines_read, 3);
    }

    fn converting_graph(policy: DataErrorPolicy) -> TransGraph {
        let mut g = TransGraph::new("convert");
        g.add_step(
            StepMeta::new("gen", "generate_rows").with_config(json!({
                "limit": 3,
                "fields": [{"name": "s", "type": "String", "value": "not a number"}]
            })),
        )
        .add_step(
            StepMeta::new("sel", "select_values")
                .with_config(json!({"convert": {"s": "Integer"}}))
                .with_error_policy(policy),
        )
        .add_step(StepMeta::new("out", "dummy"))
        .add_hop(HopMeta::new("gen", "sel"))
        .add_hop(HopMeta::new("sel", "out"));
        g
    }

    #[test]
    fn data_errors_are_skipped_or_fail_the_run() {
        let result = Transformation::execute(
            converting_graph(DataErrorPolicy::Skip),
            small_ctx(),
        )
        .unwrap();
        assert!(result.success);
        assert_eq!(result.error_count(), 3);
        assert_eq!(result.unit("out", 0).unwrap().lines_read, 0);

        let result = Transformation::execute(
            converting_graph(DataErrorPolicy::Abort),
            small_ctx(),
        )
        .unwrap();
        assert!(!result.success);
        assert_eq!(result.unit("sel", 0).unwrap().state, StepState::Errored);
        assert_eq!(result.error_count(), 1);
        assert!(matches!(result.into_result(), Err(ExecError::Failed { errors: 1, .. })));
    }

    #[test]
    fn fatal_error_stops_an_endless_run() {
        let mut g = TransGraph::new("abort");
        g.add_step(gen("gen", None))
            .add_step(StepMeta::new("stop", "abort").with_config(json!({"threshold": 10})))
            .add_hop(HopMeta::new("gen", "stop"));

        let result = Transformation::execute(g, small_ctx()).unwrap();
        assert!(!result.success);
        assert_eq!(result.unit("stop", 0).unwrap().state, StepState::Errored);
        assert_eq!(result.unit("gen", 0).unwrap().state, StepState::Stopped);
        assert_eq!(result.errors().len(), 1);
    }

    struct Panicky;

    impl StepLogic for Panicky {
        fn init(&mut self, _ctx: &StepContext<'_>) -> Result<(), StepError> {
            Ok(())
        }
        fn process_batch(&mut self, _io: &mut StepIo) -> Result<BatchOutcome, StepError> {
            panic!("boom")
        }
    }

    /// Counts `dispose` calls.
    struct Tracked(Arc<std::sync::atomic::AtomicUsize>);

    impl StepLogic for Tracked {
        fn init(&mut self, _ctx: &StepContext<'_>) -> Result<(), StepError> {
            Ok(())
        }
        fn process_batch(&mut self, _io: &mut StepIo) -> Result<BatchOutcome, StepError> {
            Ok(BatchOutcome::Finished)
        }
        fn dispose(&mut self) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn dropping_a_prepared_run_disposes_its_steps() {
        let disposed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut registry = StepRegistry::with_builtins();
        let counter = Arc::clone(&disposed);
        registry.register(StepTypeDecl::new("tracked", "counts dispose"), move || {
            Box::new(Tracked(Arc::clone(&counter))) as Box<dyn StepLogic>
        });
        let ctx = RuntimeContext::new(EngineConfig::default(), Arc::new(registry));

        let mut g = TransGraph::new("unstarted");
        g.add_step(StepMeta::new("t", "tracked").with_copies(2));
        let mut t = Transformation::new(g, ctx);
        t.prepare_execution().unwrap();
        assert_eq!(t.unit_state("t", 0), Some(StepState::Initialized));
        let shared = t.shared.clone();
        drop(t);

        assert_eq!(disposed.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert!(shared.iter().all(|s| s.state() == StepState::Disposed));
    }

    #[test]
    fn panic_in_step_is_a_unit_error() {
        let mut registry = StepRegistry::with_builtins();
        registry.register(StepTypeDecl::new("panicky", "panics"), || {
            Box::new(Panicky) as Box<dyn StepLogic>
        });
        let ctx = RuntimeContext::new(EngineConfig::default(), Arc::new(registry));

        let mut g = TransGraph::new("panic");
        g.add_step(gen("gen", None))
            .add_step(StepMeta::new("p", "panicky"))
            .add_hop(HopMeta::new("gen", "p"));

        let result = Transformation::execute(g, ctx).unwrap();
        let p = result.unit("p", 0).unwrap();
        assert_eq!(p.state, StepState::Errored);
        assert!(p.messages[0].contains("boom"));
        assert_eq!(result.unit("gen", 0).unwrap().state, StepState::Stopped);
    }

    #[test]
    fn stop_handle_bounds_the_wait() {
        let mut g = TransGraph::new("endless");
        g.add_step(gen("gen", None))
            .add_step(StepMeta::new("out", "dummy"))
            .add_hop(HopMeta::new("gen", "out"));
        let mut t = Transformation::new(g, small_ctx());
        t.prepare_execution().unwrap();
        t.start_threads().unwrap();

        let stop = t.stop_handle();
        let started = Instant::now();
        let watchdog = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            stop.stop();
        });
        let result = t.wait_until_finished().unwrap();
        watchdog.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!result.success);
        assert!(result
            .units
            .iter()
            .all(|u| u.state == StepState::Stopped));
        assert!(t.is_finished());
        assert_eq!(result.error_count(), 0);
    }

    #[test]
    fn injected_rows_reach_observer() {
        let mut g = TransGraph::new("inject");
        g.add_step(StepMeta::new("inj", "injector"))
            .add_step(StepMeta::new("out", "dummy"))
            .add_hop(HopMeta::new("inj", "out"));
        let mut t = Transformation::new(g, small_ctx());
        t.prepare_execution().unwrap();
        let producer = t.add_row_producer("inj", 0).unwrap();
        let collector = Arc::new(RowCollector::new());
        t.add_row_observer("out", 0, collector.clone()).unwrap();
        t.start_threads().unwrap();

        let schema = Arc::new(hopline_core::schema::RowSchema::new(vec![
            hopline_core::schema::ValueMeta::new("n", hopline_core::schema::DataType::Integer),
        ]));
        for n in 0..10 {
            producer.put(&schema, vec![Value::Integer(n)]).unwrap();
        }
        assert!(producer.put(&schema, vec![]).is_err());
        producer.finish();

        let result = t.wait_until_finished().unwrap();
        assert!(result.success);
        let got: Vec<Value> = collector
            .rows_written()
            .iter()
            .map(|r| r.values()[0].clone())
            .collect();
        assert_eq!(got, (0..10).map(Value::Integer).collect::<Vec<_>>());
    }
}
