//! # Shared Data Structures (eBPF ↔ Userspace)
//!
//! Defines the event record and the names/constants both sides must agree on.
//! The record type uses `#[repr(C)]` for a fixed layout across the
//! kernel/userspace boundary.
//!
//! ## Maps
//!
//! - [`EVENTS_MAP`] - Perf event array carrying [`SyscallEvent`] records
//! - [`SELF_EXCLUSION_MAP`] - The monitor's own PID (never observed)
//! - [`WATCHED_PIDS_MAP`] - PIDs observed while watch-all is off
//! - [`WATCH_ALL_MAP`] - One-entry flag switching to "every process but self"

#![no_std]

// ============================================================================
// Event Type Constants
// ============================================================================

/// `read(2)` entered by an observed process
pub const EVENT_READ: u32 = 1;

/// `write(2)` entered by an observed process
pub const EVENT_WRITE: u32 = 2;

// ============================================================================
// Map and Program Names
// ============================================================================

/// Perf event array, one ring per online CPU
pub const EVENTS_MAP: &str = "EVENTS";

/// PID → PID, seeded once with the monitor's own PID
pub const SELF_EXCLUSION_MAP: &str = "SKIP_PID";

/// PID → PID set of watched processes
pub const WATCHED_PIDS_MAP: &str = "TARGET_PIDS";

/// Single entry at [`WATCH_ALL_KEY`]; value 1 enables watch-all
pub const WATCH_ALL_MAP: &str = "WATCH_ALL";

/// Key of the only entry in [`WATCH_ALL_MAP`]
pub const WATCH_ALL_KEY: u32 = 0;

/// Value stored in [`WATCH_ALL_MAP`] when watch-all is enabled
pub const WATCH_ALL_ENABLED: u32 = 1;

/// Capacity of the PID maps
pub const MAX_WATCHED_PIDS: u32 = 1024;

/// Kprobe program attached to the `read` syscall entry point
pub const READ_PROGRAM: &str = "sys_read_call";

/// Kprobe program attached to the `write` syscall entry point
pub const WRITE_PROGRAM: &str = "sys_write_call";

// ============================================================================
// Shared Data Structures
// ============================================================================

/// Event sent from the kprobes to userspace via the perf event array
///
/// **Wire format**: 8 bytes, little-endian `pid` followed by `event_type`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SyscallEvent {
    /// Process ID (TGID in Linux terms)
    pub pid: u32,

    /// [`EVENT_READ`], [`EVENT_WRITE`], or a code userspace does not know
    pub event_type: u32,
}

impl SyscallEvent {
    /// Size of one record on the wire
    pub const SIZE: usize = 8;

    /// Decode a record from the front of `bytes`
    ///
    /// Returns `None` when fewer than [`Self::SIZE`] bytes are available.
    /// Trailing bytes (perf padding) are ignored.
    #[must_use]
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        let pid = bytes.get(0..4)?;
        let event_type = bytes.get(4..8)?;
        Some(Self {
            pid: u32::from_le_bytes([pid[0], pid[1], pid[2], pid[3]]),
            event_type: u32::from_le_bytes([
                event_type[0],
                event_type[1],
                event_type[2],
                event_type[3],
            ]),
        })
    }
}
