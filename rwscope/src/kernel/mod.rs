//! # Kernel Capability Surface
//!
//! The primitives the probe lifecycle needs from the kernel, expressed as
//! traits so the lifecycle can run against [`aya_backend::AyaKernel`] in
//! production and against a fake kernel in tests.
//!
//! ## Traits
//!
//! - [`Kernel`] - Load the probe object, read the kernel symbol table
//! - [`ProbeObject`] - A loaded object: map handles, kprobe attach/detach,
//!   event channel. Dropping it releases everything it still owns.
//! - [`KernelMap`] - `u32 → u32` key/value map CRUD
//! - [`EventChannel`] - Blocking reads of event records, force-closable from
//!   another thread
//!
//! ## Sub-Modules
//!
//! - `aya_backend` - Real implementation on top of `aya`
//! - `symbols` - `/proc/kallsyms` parsing and syscall symbol resolution
//! - `cpu_utils` - Online CPU discovery for per-CPU perf buffers

use std::sync::Arc;

use rwscope_common::{SELF_EXCLUSION_MAP, WATCHED_PIDS_MAP, WATCH_ALL_MAP};

use crate::domain::{ChannelError, KernelError, Syscall};

pub mod aya_backend;
pub mod cpu_utils;
pub mod symbols;

pub use aya_backend::{AyaKernel, PerfChannel};
pub use cpu_utils::online_cpus;
pub use symbols::SymbolTable;

/// The three key/value maps exposed by the probe object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeMap {
    SelfExclusion,
    WatchedPids,
    WatchAll,
}

impl ProbeMap {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ProbeMap::SelfExclusion => SELF_EXCLUSION_MAP,
            ProbeMap::WatchedPids => WATCHED_PIDS_MAP,
            ProbeMap::WatchAll => WATCH_ALL_MAP,
        }
    }
}

/// One item read from the event channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRecord {
    /// Raw bytes of one record as written by the probe
    Sample(Vec<u8>),
    /// The kernel overwrote this many records before they were read
    Lost(u64),
}

/// Entry point to the kernel: loads the probe object
pub trait Kernel {
    /// Load the externally built probe object
    ///
    /// # Errors
    /// Returns an error if the object cannot be read or the verifier rejects it
    fn load(&self) -> Result<Box<dyn ProbeObject>, KernelError>;

    /// Snapshot of the kernel's symbol table
    ///
    /// # Errors
    /// Returns an error if the symbol table cannot be read
    fn symbol_table(&self) -> Result<SymbolTable, KernelError>;
}

/// A loaded probe object
///
/// Dropping the object releases its programs and any link still attached.
pub trait ProbeObject: Send {
    /// Take ownership of one of the object's maps
    ///
    /// # Errors
    /// Returns an error if the map is missing or has an unexpected type
    fn take_map(&mut self, map: ProbeMap) -> Result<Arc<dyn KernelMap>, KernelError>;

    /// Attach the syscall's kprobe program to `symbol`
    ///
    /// # Errors
    /// Returns an error if the program cannot be loaded or attached
    fn attach(&mut self, syscall: Syscall, symbol: &str) -> Result<(), KernelError>;

    /// Detach the syscall's kprobe program
    ///
    /// # Errors
    /// Returns an error if the program is not attached or detach fails
    fn detach(&mut self, syscall: Syscall) -> Result<(), KernelError>;

    /// Open the reader side of the event channel
    ///
    /// # Errors
    /// Returns an error if the per-CPU buffers cannot be opened
    fn open_channel(&mut self) -> Result<Arc<dyn EventChannel>, KernelError>;
}

/// `u32 → u32` kernel-resident key/value map
pub trait KernelMap: Send + Sync {
    /// Insert or overwrite `key`
    ///
    /// # Errors
    /// Returns an error if the kernel rejects the update (e.g. map full)
    fn update(&self, key: u32, value: u32) -> Result<(), KernelError>;

    /// Value stored at `key`, `None` if absent
    ///
    /// # Errors
    /// Returns an error if the lookup syscall fails
    fn lookup(&self, key: u32) -> Result<Option<u32>, KernelError>;

    /// Remove `key`; removing an absent key is not an error
    ///
    /// # Errors
    /// Returns an error if the delete syscall fails
    fn delete(&self, key: u32) -> Result<(), KernelError>;

    /// All keys currently present; each call starts a fresh iteration
    ///
    /// # Errors
    /// Returns an error if iteration fails part-way
    fn keys(&self) -> Result<Vec<u32>, KernelError>;
}

/// Reader side of the kernel-to-user event stream
pub trait EventChannel: Send + Sync {
    /// Block until the next record is available
    ///
    /// # Errors
    /// [`ChannelError::Closed`] once [`EventChannel::close`] has been called,
    /// any other variant for a transient read failure
    fn read(&self) -> Result<ChannelRecord, ChannelError>;

    /// Close the channel, waking any thread blocked in [`EventChannel::read`]
    ///
    /// Idempotent.
    fn close(&self);
}
