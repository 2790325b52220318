use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::Command;

/// Build helpers for the rwscope workspace
#[derive(Parser)]
#[command(name = "xtask", about = "Build helpers for rwscope")]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Build the read/write kprobe object that `rwscope --object` loads
    BuildEbpf {
        /// BPF target triple
        #[arg(long, default_value = "bpfel-unknown-none")]
        target: String,
        /// Nightly toolchain used for `-Z build-std`
        #[arg(long, default_value = "nightly")]
        toolchain: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::BuildEbpf { target, toolchain } => build_ebpf(&target, &toolchain)?,
    }

    Ok(())
}

fn build_ebpf(target: &str, toolchain: &str) -> Result<()> {
    // Debug builds pull in formatting code the BPF linker rejects
    let status = Command::new("cargo")
        .arg(format!("+{toolchain}"))
        .args(["build", "--package", "rwscope-ebpf", "--target", target])
        .args(["-Z", "build-std=core", "--release"])
        .status()
        .context("Failed to run cargo for the rwscope probe")?;

    if !status.success() {
        anyhow::bail!("Building the rwscope probe object failed ({status})");
    }

    let object: PathBuf = ["target", target, "release", "rwscope"].iter().collect();
    println!("✓ rwscope probe built");
    println!("  Object: {}", object.display());
    println!("  Run:    sudo rwscope --object {} --all", object.display());

    Ok(())
}
