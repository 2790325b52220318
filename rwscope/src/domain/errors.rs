//! Structured error types for rwscope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::fmt;
use thiserror::Error;

/// Failure reported by the kernel capability surface
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("map {0} not found in probe object")]
    MissingMap(&'static str),

    #[error("program {0} not found in probe object")]
    MissingProgram(&'static str),

    #[error("program {0} is not attached")]
    NotAttached(&'static str),

    #[error("no kernel symbol found for syscall {0}")]
    SymbolNotFound(&'static str),

    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Aya(#[from] aya::EbpfError),

    #[error(transparent)]
    Map(#[from] aya::maps::MapError),

    #[error(transparent)]
    Program(#[from] aya::programs::ProgramError),

    #[error(transparent)]
    PerfBuffer(#[from] aya::maps::perf::PerfBufferError),
}

/// Step of the ordered construction sequence that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionStep {
    LoadProgram,
    OpenMaps,
    SeedSelfExclusion,
    InitWatchAll,
    ResolveSymbols,
    AttachRead,
    AttachWrite,
    OpenEventChannel,
}

impl fmt::Display for ConstructionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            ConstructionStep::LoadProgram => "load probe object",
            ConstructionStep::OpenMaps => "open probe maps",
            ConstructionStep::SeedSelfExclusion => "seed self-exclusion entry",
            ConstructionStep::InitWatchAll => "initialize watch-all flag",
            ConstructionStep::ResolveSymbols => "resolve syscall symbols",
            ConstructionStep::AttachRead => "attach sys_read kprobe",
            ConstructionStep::AttachWrite => "attach sys_write kprobe",
            ConstructionStep::OpenEventChannel => "open event channel",
        };
        f.write_str(step)
    }
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to {step}: {source}")]
    Construction {
        step: ConstructionStep,
        #[source]
        source: KernelError,
    },

    #[error("eBPF objects not initialized")]
    NotInitialized,

    #[error("failed to {op}: {source}")]
    Kernel {
        op: &'static str,
        #[source]
        source: KernelError,
    },

    #[error("watch-all flag entry is missing")]
    WatchAllUnset,

    #[error("event loop already started")]
    AlreadyStarted,

    #[error("failed to spawn {worker} thread: {source}")]
    Spawn {
        worker: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ProbeError {
    pub(crate) fn construction(step: ConstructionStep) -> impl FnOnce(KernelError) -> Self {
        move |source| ProbeError::Construction { step, source }
    }

    pub(crate) fn kernel(op: &'static str) -> impl FnOnce(KernelError) -> Self {
        move |source| ProbeError::Kernel { op, source }
    }
}

/// Classification of a failed event-channel read
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The channel was closed on purpose; the reader should exit quietly
    #[error("event channel closed")]
    Closed,

    #[error(transparent)]
    Perf(#[from] aya::maps::perf::PerfBufferError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("event record too short: {len} bytes, expected {expected}")]
    Truncated { len: usize, expected: usize },
}
