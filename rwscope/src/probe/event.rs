//! Decoded syscall events and the counters kept while consuming them

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rwscope_common::{SyscallEvent, EVENT_READ, EVENT_WRITE};

use crate::domain::{DecodeError, Pid, Syscall};

/// What an observed process did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Read,
    Write,
    /// Event type code this build does not know about
    Unknown(u32),
}

impl EventKind {
    #[must_use]
    pub fn from_code(code: u32) -> Self {
        match code {
            EVENT_READ => EventKind::Read,
            EVENT_WRITE => EventKind::Write,
            other => EventKind::Unknown(other),
        }
    }

    #[must_use]
    pub fn syscall(self) -> Option<Syscall> {
        match self {
            EventKind::Read => Some(Syscall::Read),
            EventKind::Write => Some(Syscall::Write),
            EventKind::Unknown(_) => None,
        }
    }
}

/// One record from the event channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedEvent {
    pub pid: Pid,
    pub kind: EventKind,
}

impl ObservedEvent {
    /// Decode the little-endian `{pid, event_type}` record
    ///
    /// # Errors
    /// Returns [`DecodeError::Truncated`] when `bytes` is shorter than a record
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let raw = SyscallEvent::from_le_bytes(bytes)
            .ok_or(DecodeError::Truncated { len: bytes.len(), expected: SyscallEvent::SIZE })?;
        Ok(Self { pid: Pid(raw.pid), kind: EventKind::from_code(raw.event_type) })
    }
}

impl fmt::Display for ObservedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.syscall() {
            Some(syscall) => write!(f, "[{}] pid={}", syscall, self.pid.0),
            None => write!(f, "[unknown] pid={}", self.pid.0),
        }
    }
}

/// Counters updated by the consumer thread and readable from anywhere
#[derive(Debug, Default)]
pub struct EventStats {
    reads: AtomicU64,
    writes: AtomicU64,
    unknown: AtomicU64,
    lost: AtomicU64,
    transient_errors: AtomicU64,
}

impl EventStats {
    pub fn record(&self, event: &ObservedEvent) {
        let counter = match event.kind {
            EventKind::Read => &self.reads,
            EventKind::Write => &self.writes,
            EventKind::Unknown(_) => &self.unknown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lost(&self, count: u64) {
        self.lost.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_transient_error(&self) {
        self.transient_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> EventCounts {
        EventCounts {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            transient_errors: self.transient_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`EventStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub reads: u64,
    pub writes: u64,
    pub unknown: u64,
    pub lost: u64,
    pub transient_errors: u64,
}

impl EventCounts {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.reads + self.writes + self.unknown
    }
}

impl fmt::Display for EventCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "events: reads={} writes={} unknown={} lost={} errors={}",
            self.reads, self.writes, self.unknown, self.lost, self.transient_errors
        )
    }
}
