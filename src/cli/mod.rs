//! CLI argument parsing for critsec.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use critsec::config::Backend;
use std::path::PathBuf;

/// critsec: run commands inside named cross-process critical sections.
///
/// The lock backend (file, redis, postgres, semaphore) comes from a YAML
/// config file (`--config`, or `critsec.yaml` in the current directory) and
/// can be overridden with `--backend`.
#[derive(Parser, Debug)]
#[command(name = "critsec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the YAML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Lock backend to use instead of the configured one.
    #[arg(long, global = true, value_parser = parse_backend)]
    pub backend: Option<Backend>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for critsec.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command inside a critical section.
    ///
    /// Enters the section named LABEL, runs the command, and leaves the
    /// section. Exits with code 4 without running anything if the section
    /// is held elsewhere; otherwise exits with the command's own code.
    Exec(ExecArgs),

    /// Show who holds a critical section (file backend only).
    Holder(HolderArgs),

    /// Print the effective configuration as YAML.
    Config,
}

/// Arguments for the `exec` command.
#[derive(Parser, Debug)]
pub struct ExecArgs {
    /// Name of the critical section.
    pub label: String,

    /// How long to wait for the section, in milliseconds (redis backend).
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Command line to run, split with shell quoting rules.
    #[arg(short = 'c', long = "command", conflicts_with = "argv")]
    pub command_line: Option<String>,

    /// Program and arguments to run (after `--`).
    #[arg(last = true)]
    pub argv: Vec<String>,
}

/// Arguments for the `holder` command.
#[derive(Parser, Debug)]
pub struct HolderArgs {
    /// Name of the critical section.
    pub label: String,
}

fn parse_backend(s: &str) -> Result<Backend, String> {
    Backend::from_str(s).ok_or_else(|| {
        format!(
            "unknown backend '{}' (expected file, redis, postgres, or semaphore)",
            s
        )
    })
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
