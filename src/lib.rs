// src/lib.rs

pub mod backend;
pub mod cli;
pub mod config;
pub mod context;
pub mod control;
pub mod engine;
pub mod errors;
pub mod job;
pub mod launcher;
pub mod logging;
pub mod notify;
pub mod policy;
pub mod task;
pub mod types;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate};
use crate::context::RunContext;
use crate::engine::{Finalizer, RunSummary, Scheduler, SchedulerCore, SchedulerOptions};
use crate::errors::Result;
use crate::launcher::spawn_launcher;
use crate::logging::LogControl;
use crate::notify::Reporter;
use crate::policy::{StaticPolicy, WorkflowPolicy};
use crate::task::TaskKind;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (with command-line overrides)
/// - run context, workflow policy and seed tasks
/// - execution backend and background launcher
/// - Ctrl-C handling
/// - the scheduler loop
pub async fn run(args: CliArgs, log_control: Option<LogControl>) -> Result<RunSummary> {
    let cfg = load_and_validate(&args.config, &args.overrides())?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(RunSummary::default());
    }

    let mut ctx = RunContext::from_config(&cfg);
    let mut policy = StaticPolicy::from_config(&cfg);
    let seeds = policy.seed(&mut ctx)?;
    info!(
        threads = cfg.thread.len(),
        tasks = seeds.len(),
        max_cores = cfg.config.max_cores,
        execution = cfg.config.execution.as_str(),
        "starting run"
    );

    let backend = backend::from_config(&cfg)?;
    let cancel = CancellationToken::new();
    let launcher = spawn_launcher(
        backend,
        cfg.config.max_cores,
        cfg.timing.launch_time,
        cancel.child_token(),
    );
    let control = control::spawn_interrupt_handler(cancel.clone(), log_control.clone(), args.interactive);

    let mut core = SchedulerCore::new(cfg.config.max_cores);
    core.add_tasks(seeds);

    let mut options = SchedulerOptions::from_config(&cfg);
    options.debug_task = args.debug_task.clone();

    let scheduler = Scheduler::new(
        core,
        ctx,
        policy,
        launcher,
        Finalizer::from_config(&cfg.config),
        options,
    )
    .with_reporter(Reporter::from_config(&cfg.notify))
    .with_cancel(cancel.clone())
    .with_log_control(log_control);

    let result = scheduler.run().await;

    // Stops the Ctrl-C listener.
    cancel.cancel();
    control.abort();
    result
}

/// Simple dry-run output: threads, templates, jobs and the check order.
fn print_dry_run(cfg: &ConfigFile) {
    println!("nprsched dry-run");
    println!("  config.max_cores = {}", cfg.config.max_cores);
    println!("  config.execution = {}", cfg.config.execution.as_str());
    println!("  config.max_iters = {}", cfg.config.max_iters);
    println!();

    println!("threads ({}):", cfg.thread.len());
    for (id, thread) in cfg.thread.iter() {
        println!("  - {id}");
        println!("      root: {}", thread.root);
        println!("      outpath: {}", cfg.thread_outpath(id).display());
    }
    println!();

    println!("tasks ({}):", cfg.task.len());
    for (name, task) in cfg.task.iter() {
        println!("  - {name} ({}, priority {})", task.kind, task.kind.priority());
        if !task.spawns.is_empty() {
            println!("      spawns: {:?}", task.spawns);
        }
        for job in task.jobs.iter() {
            println!("      job {} [{} core(s)]: {}", job.name, job.cores, job.cmd);
            if !job.after.is_empty() {
                println!("        after: {:?}", job.after);
            }
        }
    }
    println!();

    println!("check priority (lower first):");
    for kind in TaskKind::ALL {
        println!("  {:>3}  {kind}", kind.priority());
    }

    debug!("dry-run complete (no execution)");
}
