//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep process IDs and CPU indices apart and make
//! function signatures more expressive.

use rwscope_common::{READ_PROGRAM, WRITE_PROGRAM};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Process ID
///
/// Kernel-side maps key on the TGID, so this is always the process-level ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(pub u32);

impl Pid {
    /// PID of the running monitor
    #[must_use]
    pub fn current() -> Self {
        Pid(std::process::id())
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// CPU ID
///
/// Represents a CPU core ID (0, 1, 2, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuId(pub u32);

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU:{}", self.0)
    }
}

/// A system call with a kprobe attached to its entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Syscall {
    Read,
    Write,
}

impl Syscall {
    /// Base name used to build kernel symbol candidates (`__x64_sys_<name>`)
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Syscall::Read => "read",
            Syscall::Write => "write",
        }
    }

    /// Name of the kprobe program in the probe object
    #[must_use]
    pub fn program_name(self) -> &'static str {
        match self {
            Syscall::Read => READ_PROGRAM,
            Syscall::Write => WRITE_PROGRAM,
        }
    }
}

impl fmt::Display for Syscall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sys_{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_display() {
        assert_eq!(Pid(1234).to_string(), "PID:1234");
    }

    #[test]
    fn test_pid_serializes_as_bare_number() {
        assert_eq!(serde_json::to_string(&Pid(42)).unwrap(), "42");
        let pid: Pid = serde_json::from_str("7").unwrap();
        assert_eq!(pid, Pid(7));
    }

    #[test]
    fn test_syscall_names() {
        assert_eq!(Syscall::Read.to_string(), "sys_read");
        assert_eq!(Syscall::Write.program_name(), WRITE_PROGRAM);
    }
}
