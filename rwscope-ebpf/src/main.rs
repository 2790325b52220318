//! # eBPF Kernel-Side Instrumentation
//!
//! Kprobes on the `read`/`write` syscall entry points. Userspace picks the
//! attach symbol (`__x64_sys_read`, `__arm64_sys_read`, ...) at load time.
//!
//! ## Programs
//!
//! - **Kprobe**: `sys_read_call` - emits `EVENT_READ`
//! - **Kprobe**: `sys_write_call` - emits `EVENT_WRITE`
//!
//! ## Maps (Shared with Userspace)
//!
//! - `EVENTS` - Perf event array for the event stream
//! - `SKIP_PID` - The monitor's own PID
//! - `TARGET_PIDS` - Watched PIDs
//! - `WATCH_ALL` - Watch-all flag (key 0)
//!
//! ## Build
//!
//! Always compiled in release mode:
//! ```bash
//! cargo xtask build-ebpf
//! ```

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

use aya_ebpf::{
    helpers::bpf_get_current_pid_tgid,
    macros::{kprobe, map},
    maps::{HashMap, PerfEventArray},
    programs::ProbeContext,
};
use rwscope_common::{
    SyscallEvent, EVENT_READ, EVENT_WRITE, MAX_WATCHED_PIDS, WATCH_ALL_ENABLED, WATCH_ALL_KEY,
};

// ============================================================================
// eBPF Maps - Shared data structures between kernel and userspace
// ============================================================================

/// Perf event array for sending events to userspace (one ring per CPU)
#[map]
static EVENTS: PerfEventArray<SyscallEvent> = PerfEventArray::new(0);

/// Map: PID → PID of processes that are never reported (the monitor itself)
#[map]
static SKIP_PID: HashMap<u32, u32> = HashMap::with_max_entries(MAX_WATCHED_PIDS, 0);

/// Map: PID → PID of processes reported while watch-all is off
#[map]
static TARGET_PIDS: HashMap<u32, u32> = HashMap::with_max_entries(MAX_WATCHED_PIDS, 0);

/// Map: key 0 → 1 when every process (except `SKIP_PID`) is reported
#[map]
static WATCH_ALL: HashMap<u32, u32> = HashMap::with_max_entries(1, 0);

// ============================================================================
// eBPF Program Hooks
// ============================================================================

/// Hook: `read` syscall entry
#[kprobe]
pub fn sys_read_call(ctx: ProbeContext) -> u32 {
    handle_sys_call(&ctx, EVENT_READ)
}

/// Hook: `write` syscall entry
#[kprobe]
pub fn sys_write_call(ctx: ProbeContext) -> u32 {
    handle_sys_call(&ctx, EVENT_WRITE)
}

fn handle_sys_call(ctx: &ProbeContext, event_type: u32) -> u32 {
    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
    let pid = (pid_tgid >> 32) as u32;

    // Skip self
    if unsafe { SKIP_PID.get(&pid) }.is_some() {
        return 0;
    }

    // A missing flag entry (before userspace seeds it) reports everything
    if let Some(flag) = unsafe { WATCH_ALL.get(&WATCH_ALL_KEY).copied() } {
        if flag != WATCH_ALL_ENABLED && unsafe { TARGET_PIDS.get(&pid) }.is_none() {
            return 0;
        }
    }

    let event = SyscallEvent { pid, event_type };
    EVENTS.output(ctx, &event, 0);

    0
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
