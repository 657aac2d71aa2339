//! osim - driver for the OS concurrency simulators
//!
//! Commands:
//! - `osim threads <race|mutex|semaphore|prod-cons|all>` - Run a canned scheduler demo
//! - `osim threads --scenario <file>` - Run a TOML scenario
//! - `osim proc run <program> [args...]` - Spawn a program and wait for it
//! - `osim proc programs` - List registered programs

mod config;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use config::Settings;
use crossbeam::channel::RecvTimeoutError;
use osim_proc::{programs, ProcessState, Simulator};
use osim_sched::demos::Demo;
use osim_sched::{RunReport, Scenario, Scheduler};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "osim")]
#[command(version)]
#[command(about = "osim - thread scheduling and process lifecycle simulator", long_about = None)]
struct Cli {
    /// Config file (default: ./osim.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `osim_proc=debug`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the instruction scheduler
    Threads(ThreadsArgs),

    /// Run the process simulator
    #[command(subcommand)]
    Proc(ProcCommand),
}

#[derive(Args)]
struct ThreadsArgs {
    /// Demo to run: race, mutex, semaphore, prod-cons or all
    #[arg(default_value = "all", conflicts_with = "scenario")]
    demo: String,

    /// Scenario file to run instead of a demo
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Increments, rounds or items per demo thread
    #[arg(long)]
    items: Option<usize>,

    /// Tick cap (overrides config and scenario)
    #[arg(long)]
    max_ticks: Option<u64>,
}

#[derive(Subcommand)]
enum ProcCommand {
    /// Spawn a program as a child of init and wait for it
    Run {
        /// Give up waiting after this many seconds
        #[arg(long)]
        timeout: Option<f64>,

        /// Program name
        program: String,

        /// Program arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// List registered programs
    Programs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    init_logging(&settings, cli.log_level.as_deref());
    match Settings::source(cli.config.as_deref()) {
        Some(path) => log::debug!("[osim] settings from {}: {settings:?}", path.display()),
        None => log::debug!("[osim] default settings: {settings:?}"),
    }

    match cli.command {
        Commands::Threads(args) => run_threads(&settings, args),
        Commands::Proc(ProcCommand::Run { timeout, program, args }) => {
            run_program(&settings, timeout, &program, args)
        }
        Commands::Proc(ProcCommand::Programs) => list_programs(),
    }
}

/// `--log-level` wins over `RUST_LOG`, which wins over `[log] level`
fn init_logging(settings: &Settings, flag: Option<&str>) {
    let env = env_logger::Env::default().default_filter_or(settings.log.level.as_str());
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(filter) = flag {
        builder.parse_filters(filter);
    }
    builder.init();
}

fn run_threads(settings: &Settings, args: ThreadsArgs) -> Result<()> {
    if let Some(path) = &args.scenario {
        let scenario = Scenario::load(path)
            .with_context(|| format!("Failed to load scenario {}", path.display()))?;
        let max_ticks = args
            .max_ticks
            .or(scenario.max_ticks)
            .unwrap_or(settings.scheduler.max_ticks);

        let mut sched = scenario.build().context("Invalid scenario")?;
        log::info!("[osim] running scenario {} (max {max_ticks} ticks)", path.display());
        banner(&path.display().to_string());
        let report = sched.run(max_ticks);
        print_trace(&sched);
        let report = report?;
        print_outcome(&report);
        print_final_state(&sched);
        return Ok(());
    }

    let max_ticks = args.max_ticks.unwrap_or(settings.scheduler.max_ticks);
    let demos: Vec<Demo> = if args.demo == "all" {
        Demo::ALL.to_vec()
    } else {
        vec![args.demo.parse()?]
    };

    for demo in demos {
        log::info!("[osim] running demo {demo:?} (max {max_ticks} ticks)");
        let run = demo.run(args.items, max_ticks)?;
        banner(run.title);
        print_trace(&run.scheduler);
        print_outcome(&run.report);
        println!("{}\n", run.summary.bold());
    }
    Ok(())
}

fn banner(title: &str) {
    println!("{}", format!("=== {title} ===").cyan().bold());
}

fn print_trace(sched: &Scheduler) {
    for line in sched.trace().lines() {
        println!("{line}");
    }
}

fn print_outcome(report: &RunReport) {
    if report.is_truncated() {
        println!("{} stopped after {} ticks", "⚠".yellow(), report.ticks);
    } else {
        println!("{} completed in {} ticks", "✓".green(), report.ticks);
    }
}

fn print_final_state(sched: &Scheduler) {
    println!("\n{}", "Threads:".bold());
    for (_, thread) in sched.cpu().threads() {
        println!("  {:<8} {:<10} pc={}", thread.tid(), thread.state(), thread.pc());
    }

    if !sched.shared().is_empty() {
        println!("{}", "Counters:".bold());
        for (key, value) in sched.shared() {
            println!("  {key} = {value}");
        }
    }
}

fn run_program(
    settings: &Settings,
    timeout: Option<f64>,
    program: &str,
    args: Vec<String>,
) -> Result<()> {
    let registry = Arc::new(programs::builtin_registry()?);
    if !registry.contains(program) {
        let names: Vec<&str> = registry.names().collect();
        anyhow::bail!("Program '{}' not found. Available: {}", program, names.join(", "));
    }

    let timeout = match timeout {
        Some(secs) => Some(
            Duration::try_from_secs_f64(secs).with_context(|| format!("Invalid timeout {secs}"))?,
        ),
        None => settings.process.wait_timeout(),
    };

    let sim = Simulator::new(registry, settings.process.clone());
    let pid = sim.spawn(program, args)?;
    println!("{} spawned pid {} running {}", "▶".green(), pid, program.bold());

    log::info!("[osim] waiting on pid {pid} (timeout {timeout:?})");
    let deadline = timeout.map(|t| Instant::now() + t);
    let code = loop {
        match sim.console().recv_timeout(Duration::from_millis(50)) {
            Ok(line) => println!("{line}"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break sim.wait(pid, Some(Duration::ZERO))?,
        }

        if sim.table().state(pid)? == ProcessState::Exited {
            break sim.wait(pid, Some(Duration::ZERO))?;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break None;
        }
    };

    match code {
        Some(code) => {
            // Forked descendants may still be printing
            sim.join();
            for line in sim.console().try_iter() {
                println!("{line}");
            }
            let status = format!("pid {pid} exited with code {code}");
            if code == 0 {
                println!("{} {}", "✓".green(), status);
            } else {
                println!("{} {}", "✗".red(), status);
            }
        }
        None => {
            log::warn!("[osim] gave up waiting on pid {pid}");
            for line in sim.console().try_iter() {
                println!("{line}");
            }
            println!("{} pid {} still running after timeout", "⚠".yellow(), pid);
        }
    }

    println!("\n{}", "ps".bold());
    for info in sim.ps() {
        println!("{info}");
    }
    println!("\n{}", "tree".bold());
    print!("{}", sim.render_tree());
    Ok(())
}

fn list_programs() -> Result<()> {
    let registry = programs::builtin_registry()?;
    println!("{}", "Programs:".bold());
    for name in registry.names() {
        println!("  {name}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_threads_defaults_to_all() {
        let cli = Cli::try_parse_from(["osim", "threads"]).unwrap();
        match cli.command {
            Commands::Threads(args) => {
                assert_eq!(args.demo, "all");
                assert!(args.scenario.is_none());
            }
            _ => panic!("expected threads"),
        }
    }

    #[test]
    fn test_scenario_conflicts_with_demo() {
        assert!(Cli::try_parse_from(["osim", "threads", "race", "--scenario", "x.toml"]).is_err());
    }

    #[test]
    fn test_proc_run_keeps_program_args() {
        let cli =
            Cli::try_parse_from(["osim", "proc", "run", "--timeout", "2", "prog_echo", "a", "-b"])
                .unwrap();
        match cli.command {
            Commands::Proc(ProcCommand::Run { timeout, program, args }) => {
                assert_eq!(timeout, Some(2.0));
                assert_eq!(program, "prog_echo");
                assert_eq!(args, vec!["a".to_string(), "-b".to_string()]);
            }
            _ => panic!("expected proc run"),
        }
    }

    #[test]
    fn test_sample_scenario_loses_an_update() {
        let scenario = Scenario::from_toml(include_str!("../scenarios/lost_update.toml")).unwrap();
        let mut sched = scenario.build().unwrap();
        let report = sched.run(scenario.max_ticks.unwrap()).unwrap();
        assert!(!report.is_truncated());
        assert_eq!(report.ticks, 18);
        assert_eq!(sched.counter("balance"), 3);
    }
}
