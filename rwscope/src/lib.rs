//! # rwscope - read/write syscall observation for selected processes
//!
//! rwscope attaches kprobes to the `read` and `write` syscall entry points
//! and reports which processes call them. Which processes count is decided
//! in the kernel by two maps: a set of watched PIDs, and a watch-all flag
//! that switches to "every process except the monitor itself". Both can be
//! changed while the probe runs.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     eBPF Programs (Kernel)                      │
//! │  • Kprobes: sys_read_call, sys_write_call                       │
//! │  • Maps: SKIP_PID, TARGET_PIDS, WATCH_ALL                       │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ perf event array (per CPU)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      rwscope (This Crate)                       │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐                            │
//! │  │    Probe     │──▶│    Event     │  (event-consumer thread)   │
//! │  │   Manager    │   │   Consumer   │                            │
//! │  └──────┬───────┘   └──────────────┘                            │
//! │         │ map writes          ▲ map reads                       │
//! │  ┌──────┴───────┐   ┌─────────┴────┐   ┌──────────────┐         │
//! │  │    State     │◀──│   Command    │◀──│   Control    │         │
//! │  │   Mediator   │   │    Queue     │   │    Handle    │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! │  (state-mediator thread)                                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`kernel`]: Capability traits over the kernel and their `aya` implementation
//!   - `symbols`: Resolve syscall entry symbols from `/proc/kallsyms`
//!   - `aya_backend`: Probe loading, map handles, blocking perf reader
//! - [`probe`]: [`probe::ProbeManager`] lifecycle, map CRUD, event consumption
//! - [`control`]: Commands, the bounded queue, the single-writer mediator and
//!   the [`control::ControlHandle`] given to front ends
//! - [`app`]: [`app::Monitor`], the composed running system
//! - [`cli`]: Command-line argument parsing
//! - [`preflight`]: Privilege and environment checks run before loading
//! - [`domain`]: Core domain types (Pid, CpuId, Syscall) and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Build the probe object, then watch two processes
//! cargo xtask build-ebpf
//! sudo ./rwscope --pid 1234 --pid 5678
//!
//! # Watch everything, change the watch list at runtime
//! echo '{"kind":"add_watched_pid","pid":42}' | sudo ./rwscope --all --stdin
//! ```

pub mod app;
pub mod cli;
pub mod control;
pub mod domain;
pub mod kernel;
pub mod preflight;
pub mod probe;

#[cfg(test)]
mod tests;
