//! Kernel symbol table lookup
//!
//! Syscall entry points are named differently per architecture and kernel
//! version (`__x64_sys_read` on x86-64 since 4.17, `__arm64_sys_read` on
//! arm64, plain `sys_read` on older kernels), so the attach symbol is picked
//! from `/proc/kallsyms` at startup.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::info;

use crate::domain::{KernelError, Syscall};

/// Default location of the kernel symbol table
pub const KALLSYMS_PATH: &str = "/proc/kallsyms";

/// Syscall symbol prefixes, probed in order
pub const SYSCALL_PREFIXES: [&str; 4] = ["__x64_sys_", "__arm64_sys_", "__arm_sys_", "sys_"];

/// Set of kernel symbol names
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    names: HashSet<String>,
}

impl SymbolTable {
    /// Read and parse a kallsyms-formatted file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read
    pub fn load(path: &Path) -> Result<Self, KernelError> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Parse kallsyms lines: `<address> <type> <name> [<module>]`
    ///
    /// Lines with fewer than three columns are skipped.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let names = content
            .lines()
            .filter_map(|line| line.split_whitespace().nth(2))
            .map(str::to_string)
            .collect();
        Self { names }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// First symbol candidate for `syscall` present in the table
    ///
    /// # Errors
    /// Returns [`KernelError::SymbolNotFound`] if no candidate matches
    pub fn resolve_syscall(&self, syscall: Syscall) -> Result<String, KernelError> {
        let symbol = syscall_candidates(syscall)
            .find(|candidate| self.contains(candidate))
            .ok_or(KernelError::SymbolNotFound(syscall.name()))?;
        info!("Found syscall symbol: {symbol}");
        Ok(symbol)
    }
}

impl FromIterator<String> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self { names: iter.into_iter().collect() }
    }
}

/// Candidate symbol names for `syscall`, most specific first
pub fn syscall_candidates(syscall: Syscall) -> impl Iterator<Item = String> {
    SYSCALL_PREFIXES.iter().map(move |prefix| format!("{prefix}{}", syscall.name()))
}
