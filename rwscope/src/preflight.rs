//! Pre-flight checks for rwscope
//!
//! Validates system requirements before attempting to load the probe.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::kernel::symbols::KALLSYMS_PATH;

/// Oldest kernel with perf event array output from kprobes
const MIN_KERNEL_VERSION: (u32, u32) = (4, 9);

/// Run all pre-flight checks before loading the probe
///
/// # Errors
/// Returns the first failed check with a hint on how to fix it
pub fn run_preflight_checks(object_path: &Path) -> Result<()> {
    check_privileges()?;
    check_kernel_version()?;
    check_object_exists(object_path)?;
    check_kallsyms_readable(Path::new(KALLSYMS_PATH))?;
    Ok(())
}

/// Check if running with sufficient privileges to load kprobes
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    bail!(
        "Permission denied: rwscope requires root privileges to attach kprobes.\n\n\
         Run with: sudo rwscope ..."
    );
}

fn check_kernel_version() -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // "Linux version 5.15.0-generic ..."
    let release = version_str.split_whitespace().nth(2).unwrap_or("unknown");

    let Some(version) = parse_kernel_release(release) else {
        // Can't parse, assume it's fine
        return Ok(());
    };

    if version < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {}.{} is too old.\n\n\
             rwscope requires Linux {}.{} or newer.\n\
             Current kernel: {release}",
            version.0,
            version.1,
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
        );
    }

    Ok(())
}

/// `(major, minor)` from a release string like `6.1.0-arch1-1`
fn parse_kernel_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor: String = parts.next()?.chars().take_while(char::is_ascii_digit).collect();
    Some((major, minor.parse().ok()?))
}

/// Check if the probe object exists and is a regular file
fn check_object_exists(object_path: &Path) -> Result<()> {
    if !object_path.exists() {
        bail!(
            "Probe object not found: {}\n\n\
             Build it with: cargo xtask build-ebpf",
            object_path.display()
        );
    }
    if !object_path.is_file() {
        bail!(
            "Not a file: {}\n\n\
             --object must point to the compiled probe, not a directory.",
            object_path.display()
        );
    }
    Ok(())
}

/// Check that the kernel symbol table can be read
fn check_kallsyms_readable(path: &Path) -> Result<()> {
    std::fs::File::open(path).with_context(|| {
        format!(
            "Cannot read {}\n\n\
             Syscall entry points are resolved from the kernel symbol table.\n\
             Make sure /proc is mounted and kernel.kptr_restrict allows root.",
            path.display()
        )
    })?;
    Ok(())
}
