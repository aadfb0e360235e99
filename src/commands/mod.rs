//! Command implementations for critsec.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations.

mod exec;

use crate::cli::{Cli, Command, HolderArgs};
use critsec::config::{Backend, Config};
use critsec::driver::{FileDriver, LockDriver};
use critsec::error::{CriticalSectionError, Result};
use critsec::exit_codes;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "critsec.yaml";

/// Dispatch a command to its implementation.
///
/// Returns the exit code the process should end with.
pub fn dispatch(cli: Cli) -> Result<i32> {
    let config = resolve_config(cli.config.as_deref(), cli.backend)?;

    match cli.command {
        Command::Exec(args) => exec::cmd_exec(config, args),
        Command::Holder(args) => cmd_holder(&config, args),
        Command::Config => cmd_config(&config),
    }
}

/// Load the config file (explicit, or `critsec.yaml` if present) and apply
/// command-line overrides.
fn resolve_config(path: Option<&Path>, backend: Option<Backend>) -> Result<Config> {
    let path: Option<PathBuf> = match path {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
            candidate.is_file().then_some(candidate)
        }
    };

    let mut config = match &path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            Config::load(path)?
        }
        None => Config::default(),
    };

    if let Some(backend) = backend {
        config.backend = backend;
        config.validate()?;
    }
    Ok(config)
}

fn cmd_holder(config: &Config, args: HolderArgs) -> Result<i32> {
    if config.backend != Backend::File {
        return Err(CriticalSectionError::Config(format!(
            "holder metadata is only recorded by the file backend (configured: {})",
            config.backend.as_str()
        )));
    }

    let mut driver = FileDriver::new(&config.lock_dir)?;

    // Metadata can outlive a crashed holder; only trust it while the lock is taken.
    if driver.acquire_lock(&args.label)? {
        driver.release_lock(&args.label)?;
        println!("{}: free", args.label);
        return Ok(exit_codes::SUCCESS);
    }

    match driver.holder(&args.label)? {
        Some(holder) => println!("{}", holder),
        None => println!("{}: held (no holder metadata)", args.label),
    }
    Ok(exit_codes::SUCCESS)
}

fn cmd_config(config: &Config) -> Result<i32> {
    print!("{}", config.to_yaml()?);
    Ok(exit_codes::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_config_file_is_loaded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.yaml");
        std::fs::write(&path, "acquire_timeout_ms: 5\n").unwrap();

        let config = resolve_config(Some(&path), None).unwrap();
        assert_eq!(config.acquire_timeout_ms, 5);
    }

    #[test]
    fn backend_override_is_validated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.yaml");
        std::fs::write(&path, "backend: file\n").unwrap();

        let err = resolve_config(Some(&path), Some(Backend::Postgres)).unwrap_err();
        assert!(err.to_string().contains("database_url"));
    }

    #[test]
    fn holder_rejects_non_file_backend() {
        let config = Config {
            backend: Backend::Redis,
            ..Config::default()
        };
        let err = cmd_holder(
            &config,
            HolderArgs {
                label: "x".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }

    #[test]
    fn holder_of_free_label_succeeds() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            lock_dir: temp.path().to_path_buf(),
            ..Config::default()
        };
        let code = cmd_holder(
            &config,
            HolderArgs {
                label: "x".to_string(),
            },
        )
        .unwrap();
        assert_eq!(code, exit_codes::SUCCESS);
    }
}
