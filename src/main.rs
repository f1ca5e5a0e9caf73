// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! ShiftGuard - Shift & Telemetry Alerting Engine
//!
//! Command-line front end: seeds reference data and tasks, drives the shift
//! lifecycle, runs one-off status cycles or a polling loop, and reports on
//! the stored alert history.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use shiftguard::config::Config;
use shiftguard::model::{Machine, NewTask, Operator, ShiftId, TaskId};
use shiftguard::{Engine, Poller, VERSION};

/// ShiftGuard - Shift & Telemetry Alerting Engine
#[derive(Parser, Debug)]
#[command(name = "shiftguard")]
#[command(author = "ShiftGuard Project")]
#[command(version = VERSION)]
#[command(about = "Operator shift tracking and live telemetry alerting for heavy equipment")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with simulated telemetry
    #[arg(long)]
    demo: bool,

    /// Data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Database file, absolute or relative to the data directory
    #[arg(long)]
    db: Option<PathBuf>,

    /// Serve a snapshot file for a machine in demo mode (MACHINE=FILE, repeatable)
    #[arg(long, value_parser = parse_pin)]
    pin: Vec<(String, PathBuf)>,

    /// Telemetry service base URL
    #[arg(long)]
    telemetry_url: Option<String>,

    /// Scoring service base URL
    #[arg(long)]
    scoring_url: Option<String>,

    /// Disable the anomaly classifier and duration estimator
    #[arg(long)]
    no_scoring: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register an operator
    RegisterOperator {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
    },
    /// Register a machine
    RegisterMachine {
        #[arg(long)]
        id: String,
        #[arg(long)]
        model: Option<String>,
    },
    /// Store scheduled tasks from a JSON file (array of tasks)
    Schedule { file: PathBuf },
    /// Open a shift for an operator on a machine
    Login {
        #[arg(long)]
        operator: String,
        #[arg(long)]
        machine: String,
    },
    /// Set the active task of a shift
    SetTask {
        #[arg(long)]
        shift: ShiftId,
        #[arg(long)]
        task: TaskId,
    },
    /// Close a shift
    Close {
        #[arg(long)]
        shift: ShiftId,
    },
    /// Run one live status cycle
    Status {
        #[arg(long)]
        shift: ShiftId,
    },
    /// Poll every open shift until Ctrl+C
    Watch {
        /// Seconds between polls
        #[arg(long)]
        interval: Option<u64>,
    },
    /// List the stored alerts of a shift
    Events {
        #[arg(long)]
        shift: ShiftId,
    },
    /// Alert totals per operator
    Summary,
    /// Estimate how long a scheduled task will take
    Estimate {
        #[arg(long)]
        task: TaskId,
    },
}

fn main() {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let config = match Config::load_or_create(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Could not load configuration from {:?}: {:#}", config_path, e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let directive = log_directive(args.debug, args.trace, &config.log_level);
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|e| {
        eprintln!("invalid log level {:?}: {}", directive, e);
        EnvFilter::new("info")
    });

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("logging unavailable: {}", e);
    }

    info!("ShiftGuard v{}", VERSION);
    info!("Configuration loaded from {:?}", config_path);

    if let Err(e) = run(args, config) {
        error!("{:#}", e);
        std::process::exit(exit_code(&e));
    }
}

/// Command-line flags win over the configured level
fn log_directive(debug: bool, trace: bool, configured: &str) -> &str {
    if trace {
        "trace"
    } else if debug {
        "debug"
    } else {
        configured
    }
}

fn parse_pin(raw: &str) -> std::result::Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((machine, file)) if !machine.is_empty() && !file.is_empty() => {
            Ok((machine.to_string(), PathBuf::from(file)))
        }
        _ => Err(format!("expected MACHINE=FILE, got {:?}", raw)),
    }
}

fn run(args: Args, mut config: Config) -> Result<()> {
    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(db) = args.db {
        config.database.path = db;
    }
    if let Some(url) = args.telemetry_url {
        config.telemetry.base_url = url;
    }
    if let Some(url) = args.scoring_url {
        config.scoring.base_url = url;
    }
    if args.no_scoring {
        config.scoring.enabled = false;
    }
    config.simulator.pinned.extend(args.pin);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(execute(config, args.command))
}

async fn execute(config: Config, command: Command) -> Result<()> {
    let engine = Engine::from_config(config)?;

    match command {
        Command::RegisterOperator { id, name } => {
            engine.register_operator(&Operator { id, name })?;
        }
        Command::RegisterMachine { id, model } => {
            engine.register_machine(&Machine { id, model })?;
        }
        Command::Schedule { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let tasks: Vec<NewTask> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", file.display()))?;
            print_json(&engine.schedule_tasks(&tasks)?)?;
        }
        Command::Login { operator, machine } => {
            print_json(&engine.login(&operator, &machine)?)?;
        }
        Command::SetTask { shift, task } => {
            print_json(&engine.set_active_task(shift, task).await?)?;
        }
        Command::Close { shift } => {
            print_json(&engine.close_shift(shift).await?)?;
        }
        Command::Status { shift } => {
            print_json(&engine.live_status(shift).await?)?;
        }
        Command::Watch { interval } => watch(engine, interval).await?,
        Command::Events { shift } => {
            print_json(&engine.events_for_shift(shift)?)?;
        }
        Command::Summary => {
            print_json(&engine.operator_summary()?)?;
        }
        Command::Estimate { task } => {
            let estimate = engine.estimate_task_duration(task).await?;
            println!("{}", estimate.readable());
        }
    }

    Ok(())
}

/// Poll until Ctrl+C
async fn watch(engine: Engine, interval: Option<u64>) -> Result<()> {
    use tokio::sync::broadcast;

    let engine = Arc::new(engine);
    let mut poller = Poller::new(engine.clone());
    if let Some(secs) = interval {
        poller = poller.with_interval(std::time::Duration::from_secs(secs.max(1)));
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move { poller.run(shutdown_rx).await });

    info!("Watching open shifts");
    info!("   Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, cleaning up...");
    let _ = shutdown_tx.send(());
    handle.await??;

    let state = engine.state();
    info!(
        cycles = state.cycles,
        alerts = state.alerts,
        telemetry_failures = state.telemetry_failures,
        scoring_degraded = state.scoring_degraded,
        "ShiftGuard shutdown complete"
    );
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Distinct exit status per engine outcome
fn exit_code(e: &anyhow::Error) -> i32 {
    let Some(err) = e.downcast_ref::<shiftguard::Error>() else {
        return 1;
    };
    match err.kind() {
        "ShiftAlreadyOpen" => 3,
        "ShiftNotOpen" => 4,
        "TaskMismatch" => 5,
        "TaskNotFound" => 6,
        "NoActiveShift" => 7,
        "UnknownReference" => 8,
        "TelemetryUnavailable" => 9,
        "ScoringUnavailable" => 10,
        "PersistenceFailure" => 11,
        "MalformedGeofence" => 12,
        _ => 1,
    }
}
