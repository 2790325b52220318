//! CPU utility functions
//!
//! The perf event array needs one buffer per online CPU.

use std::fs;

use crate::domain::{CpuId, KernelError};

const ONLINE_CPUS_PATH: &str = "/sys/devices/system/cpu/online";

/// Get list of online CPU IDs from /sys/devices/system/cpu/online
///
/// # Errors
/// Returns an error if the file cannot be read or parsed
pub fn online_cpus() -> Result<Vec<CpuId>, KernelError> {
    let content = fs::read_to_string(ONLINE_CPUS_PATH)?;
    parse_cpu_list(&content)
}

/// Parse a kernel CPU list like "0-3" or "0-3,8-11" (NUMA systems)
///
/// # Errors
/// Returns an error on a malformed entry or an empty list
pub fn parse_cpu_list(content: &str) -> Result<Vec<CpuId>, KernelError> {
    let malformed =
        |range: &str| KernelError::Unavailable(format!("malformed CPU list entry '{range}'"));

    let mut cpus = Vec::new();

    for range in content.trim().split(',').filter(|r| !r.is_empty()) {
        if let Some((start, end)) = range.split_once('-') {
            let start: u32 = start.parse().map_err(|_| malformed(range))?;
            let end: u32 = end.parse().map_err(|_| malformed(range))?;
            cpus.extend((start..=end).map(CpuId));
        } else {
            let cpu: u32 = range.parse().map_err(|_| malformed(range))?;
            cpus.push(CpuId(cpu));
        }
    }

    if cpus.is_empty() {
        return Err(KernelError::Unavailable("no online CPUs reported".to_string()));
    }

    Ok(cpus)
}
