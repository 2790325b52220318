//! # rwscope - Main Entry Point
//!
//! Loads the probe, applies the initial watch list from the command line,
//! optionally accepts management commands on stdin, and runs until Ctrl+C,
//! SIGTERM or the `--duration` limit.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::io::BufRead;
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, SignalKind};

use rwscope::app::{Monitor, MonitorConfig};
use rwscope::cli::Args;
use rwscope::control::{Command, ControlHandle};
use rwscope::domain::Pid;
use rwscope::kernel::AyaKernel;
use rwscope::preflight::run_preflight_checks;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else if msg.contains("must be a power of two") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Commands implied by `--pid` and `--all`
fn initial_commands(args: &Args) -> Vec<Command> {
    let mut commands: Vec<Command> =
        args.pids.iter().map(|&pid| Command::AddWatchedPid { pid: Pid(pid) }).collect();
    if args.all {
        commands.push(Command::SetWatchAll { enabled: true });
    }
    commands
}

/// Read one command per line until stdin closes
fn stdin_commands(control: &ControlHandle) {
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read stdin: {e}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "status" {
            print_status(control);
            continue;
        }
        if let Err(e) = control.enqueue_json(line) {
            eprintln!("invalid command: {e}");
        }
    }
    info!("stdin closed, no more commands");
}

fn print_status(control: &ControlHandle) {
    match control.watched_pids() {
        Ok(pids) => {
            let pids: Vec<String> = pids.iter().map(|pid| pid.0.to_string()).collect();
            println!("watched: [{}]", pids.join(", "));
        }
        Err(e) => eprintln!("watched: {e}"),
    }
    match control.watch_all_state() {
        Ok(enabled) => println!("watch_all: {enabled}"),
        Err(e) => eprintln!("watch_all: {e}"),
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    if !args.perf_pages.is_power_of_two() {
        anyhow::bail!("--perf-pages must be a power of two (got {})", args.perf_pages);
    }

    run_preflight_checks(&args.object)?;

    if !quiet {
        println!("rwscope v{}", env!("CARGO_PKG_VERSION"));
        println!("object: {}", args.object.display());
        println!("pid: {}", std::process::id());
    }

    let kernel = AyaKernel::new(&args.object).with_perf_pages(args.perf_pages);
    let config = MonitorConfig { queue_capacity: args.queue_capacity, ..MonitorConfig::default() };
    let monitor = Monitor::start(&kernel, config).context("Failed to start probe")?;
    let control = monitor.control();

    for command in initial_commands(&args) {
        control.enqueue(command);
    }

    if args.stdin {
        let control = control.clone();
        std::thread::Builder::new()
            .name("stdin-commands".to_string())
            .spawn(move || stdin_commands(&control))
            .context("Failed to spawn stdin reader")?;
    }

    if !quiet {
        println!("watching (Ctrl+C to stop)");
    }

    let started = Instant::now();
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let duration_limit = async {
        if args.duration > 0 {
            tokio::time::sleep(Duration::from_secs(args.duration)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    let exit_reason = tokio::select! {
        _ = tokio::signal::ctrl_c() => "interrupted",
        _ = sigterm.recv() => "terminated",
        () = duration_limit => "duration limit reached",
    };

    monitor.stop();

    if !quiet {
        let counts = monitor.event_counts();
        eprintln!(
            "\n{exit_reason}: {:.1}s, {} ({} commands dropped)",
            started.elapsed().as_secs_f64(),
            counts,
            control.dropped_commands(),
        );
    }

    Ok(())
}
