//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::control::DEFAULT_QUEUE_CAPACITY;
use crate::kernel::aya_backend::DEFAULT_PERF_PAGES;

/// Where `cargo xtask build-ebpf` leaves the probe object
pub const DEFAULT_OBJECT_PATH: &str = "target/bpfel-unknown-none/release/rwscope";

#[derive(Parser, Debug)]
#[command(
    name = "rwscope",
    version,
    about = "Watch read/write syscalls of selected processes",
    after_help = "\
EXAMPLES:
    sudo rwscope --pid 1234 --pid 5678       Watch two processes
    sudo rwscope --all --duration 30         Watch every process for 30s
    sudo rwscope --stdin                     Manage the watch list from stdin

STDIN COMMANDS (one per line, with --stdin):
    {\"kind\":\"add_watched_pid\",\"pid\":1234}
    {\"kind\":\"clear_watched_pids\"}
    {\"kind\":\"set_watch_all\",\"enabled\":true}
    status"
)]
pub struct Args {
    /// Path to the compiled probe object
    #[arg(long, value_name = "PATH", default_value = DEFAULT_OBJECT_PATH)]
    pub object: PathBuf,

    /// Process ID to watch (repeatable)
    #[arg(short, long = "pid", value_name = "PID")]
    pub pids: Vec<u32>,

    /// Watch every process except this one
    #[arg(short, long, conflicts_with = "pids")]
    pub all: bool,

    /// Pending management commands kept before new ones are dropped
    #[arg(long, value_name = "N", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Perf buffer size per CPU in pages (power of two)
    #[arg(long, value_name = "N", default_value_t = DEFAULT_PERF_PAGES)]
    pub perf_pages: usize,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Read management commands from stdin
    #[arg(long)]
    pub stdin: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}
