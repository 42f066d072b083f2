//! hopline CLI: run, validate and explain transformation graphs.

use clap::{Parser, Subcommand};
use hopline_core::config::EngineConfig;
use hopline_exec::{RunResult, RuntimeContext, Transformation};
use hopline_planner::{parse_yaml_graph, validate, ConfigOverrides, ParsedGraph};
use hopline_steps::StepRegistry;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "hopline")]
#[command(about = "hopline: thread-per-step ETL engine with bounded row channels", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Default, Clone)]
struct EngineArgs {
    /// Rows buffered per channel (overrides graph config and env)
    #[arg(long)]
    channel_capacity: Option<usize>,

    /// Rows moved per process_batch call
    #[arg(long)]
    batch_rows: Option<usize>,

    /// Enforce one row layout per step output
    #[arg(long)]
    safe_mode: bool,

    /// Prefix for unit thread names
    #[arg(long)]
    thread_prefix: Option<String>,
}

impl EngineArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            channel_capacity: self.channel_capacity,
            safe_mode: self.safe_mode.then_some(true),
            thread_prefix: self.thread_prefix.clone(),
            batch_rows: self.batch_rows,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a graph from a YAML file
    Run {
        /// Path to the graph YAML file
        #[arg(short, long)]
        graph: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,

        /// Stop the run after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a graph YAML file without running it
    Validate {
        /// Path to the graph YAML file
        #[arg(short, long)]
        graph: PathBuf,
    },

    /// Show the execution order of a graph (EXPLAIN)
    Explain {
        /// Path to the graph YAML file
        #[arg(short, long)]
        graph: PathBuf,
    },

    /// List the registered step types
    Steps,
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            graph,
            engine,
            timeout_ms,
            json,
        } => match run_graph(&graph, &engine, timeout_ms) {
            Ok(result) => {
                print_result(&result, json);
                if !result.success {
                    std::process::exit(2);
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        Commands::Validate { graph } => match validate_graph(&graph) {
            Ok((steps, hops)) => println!("✓ Graph is valid ({steps} steps, {hops} hops)"),
            Err(e) => {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
        },
        Commands::Explain { graph } => {
            if let Err(e) = explain_graph(&graph) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Steps => {
            let registry = StepRegistry::with_builtins();
            for decl in registry.declarations() {
                let max = decl
                    .max_inputs
                    .map_or_else(|| "any".to_string(), |m| m.to_string());
                println!(
                    "{:<16} inputs {}..{}  {}",
                    decl.id, decl.min_inputs, max, decl.description
                );
            }
        }
    }
}

fn load_graph(path: &Path) -> Result<ParsedGraph, Box<dyn std::error::Error>> {
    let yaml = fs::read_to_string(path)?;
    Ok(parse_yaml_graph(&yaml)?)
}

/// Env first, then the graph's `config:` block, then command-line flags.
fn engine_config(parsed: &ParsedGraph, args: &EngineArgs) -> EngineConfig {
    let mut config = EngineConfig::from_env();
    parsed
        .config
        .clone()
        .merged(&args.overrides())
        .apply_to(&mut config);
    config
}

fn run_graph(
    path: &Path,
    args: &EngineArgs,
    timeout_ms: Option<u64>,
) -> Result<RunResult, Box<dyn std::error::Error>> {
    let parsed = load_graph(path)?;
    let config = engine_config(&parsed, args);
    let ctx = RuntimeContext::new(config, Arc::new(StepRegistry::with_builtins()));

    let mut trans = Transformation::new(parsed.graph, ctx);
    trans.prepare_execution()?;
    trans.start_threads()?;

    if let Some(ms) = timeout_ms {
        let stop = trans.stop_handle();
        std::thread::Builder::new()
            .name("hopline-watchdog".into())
            .spawn(move || {
                std::thread::sleep(Duration::from_millis(ms));
                if !stop.is_stopped() {
                    tracing::warn!(timeout_ms = ms, "timeout reached; stopping run");
                    stop.stop();
                }
            })?;
    }

    Ok(trans.wait_until_finished()?)
}

fn print_result(result: &RunResult, json: bool) {
    if json {
        match serde_json::to_string_pretty(result) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Error: {}", e),
        }
        return;
    }

    let mark = if result.success { "✓" } else { "✗" };
    println!(
        "{mark} Graph '{}' {}",
        result.manifest.graph_name,
        if result.success { "finished" } else { "failed" }
    );
    println!("  Duration: {}ms", result.manifest.duration_ms());
    println!("  Graph hash: {}", result.manifest.graph_hash.to_hex());
    println!("  Errors: {}", result.error_count());
    for u in &result.units {
        println!(
            "  {:<24} {:<9} read {:>8}  written {:>8}  errors {}",
            u.unit.to_string(),
            u.state.to_string(),
            u.lines_read,
            u.lines_written,
            u.errors
        );
    }
    for (unit, message) in result.errors() {
        println!("  ! {unit}: {message}");
    }
}

fn validate_graph(path: &Path) -> Result<(usize, usize), Box<dyn std::error::Error>> {
    let parsed = load_graph(path)?;
    validate(&parsed.graph, &StepRegistry::with_builtins())?;
    Ok((parsed.graph.steps.len(), parsed.graph.hops.len()))
}

fn explain_graph(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = load_graph(path)?;
    let plan = validate(&parsed.graph, &StepRegistry::with_builtins())?;
    let config = parsed.engine_config();

    println!("Transformation Plan");
    println!("===================");
    println!();
    println!("Channel capacity: {} rows", config.channel_capacity);
    println!("Batch rows: {}", config.batch_rows);
    println!("Safe mode: {}", config.safe_mode);
    println!();
    print!("{}", plan.explain(&parsed.graph));
    println!();
    println!("Sources: {}", plan.sources.join(", "));
    println!("Sinks: {}", plan.sinks.join(", "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPH: &str = r#"
name: demo
config:
  channel_capacity: 50
  batch_rows: 10
steps:
  - name: gen
    type: generate_rows
    config:
      limit: 5
      fields: [{name: n, type: Integer, value: 1}]
  - name: out
    type: dummy
hops:
  - {from: gen, to: out}
"#;

    #[test]
    fn flags_override_graph_config() {
        let parsed = parse_yaml_graph(GRAPH).unwrap();
        let args = EngineArgs {
            channel_capacity: Some(7),
            safe_mode: true,
            ..Default::default()
        };
        let config = engine_config(&parsed, &args);
        assert_eq!(config.channel_capacity, 7);
        assert_eq!(config.batch_rows, 10);
        assert!(config.safe_mode);
    }

    #[test]
    fn graph_config_applies_without_flags() {
        let parsed = parse_yaml_graph(GRAPH).unwrap();
        let config = engine_config(&parsed, &EngineArgs::default());
        assert_eq!(config.channel_capacity, 50);
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "hopline",
            "run",
            "-g",
            "g.yaml",
            "--channel-capacity",
            "3",
            "--timeout-ms",
            "100",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                engine,
                timeout_ms,
                json,
                ..
            } => {
                assert_eq!(engine.channel_capacity, Some(3));
                assert_eq!(timeout_ms, Some(100));
                assert!(json);
            }
            _ => panic!("expected run"),
        }
    }
}
