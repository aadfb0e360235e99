//! `critsec exec`: run a command inside a critical section.

use crate::cli::ExecArgs;
use critsec::CriticalSection;
use critsec::config::Config;
use critsec::error::{CriticalSectionError, Result};
use critsec::exit_codes;
use std::process::{Command, ExitStatus};
use tracing::{debug, info};

/// Program and arguments to run, from either `-c` or the trailing argv.
fn program_args(args: &ExecArgs) -> Result<Vec<String>> {
    let argv = match &args.command_line {
        Some(line) => shell_words::split(line).map_err(|e| {
            CriticalSectionError::Config(format!("invalid command line '{}': {}", line, e))
        })?,
        None => args.argv.clone(),
    };

    if argv.is_empty() {
        return Err(CriticalSectionError::Config(
            "no command given (use `-c \"...\"` or `-- <program> [args...]`)".to_string(),
        ));
    }
    Ok(argv)
}

/// Exit code for a finished child. Signals map to `128 + N` like in a shell.
fn child_exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return exit_codes::SIGNAL_BASE + signal;
        }
    }
    exit_codes::BACKEND_FAILURE
}

pub fn cmd_exec(mut config: Config, args: ExecArgs) -> Result<i32> {
    let argv = program_args(&args)?;
    if let Some(timeout_ms) = args.timeout_ms {
        config.acquire_timeout_ms = timeout_ms;
    }

    let mut section = CriticalSection::new(config.open_driver()?);
    if !section.enter(&args.label)? {
        info!(label = %args.label, backend = config.backend.as_str(), "critical section busy");
        eprintln!("critical section '{}' is held elsewhere", args.label);
        section.close()?;
        return Ok(exit_codes::LOCK_FAILURE);
    }

    debug!(label = %args.label, program = %argv[0], "running command inside critical section");
    let status = Command::new(&argv[0]).args(&argv[1..]).status();

    // Leave before reporting a spawn failure so the section is never stranded.
    section.close()?;

    let status = status
        .map_err(|e| CriticalSectionError::io(format!("failed to run '{}'", argv[0]), e))?;
    debug!(label = %args.label, ?status, "command finished");
    Ok(child_exit_code(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use critsec::driver::{FileDriver, LockDriver};
    use tempfile::TempDir;

    fn exec_args(label: &str, argv: &[&str]) -> ExecArgs {
        ExecArgs {
            label: label.to_string(),
            timeout_ms: None,
            command_line: None,
            argv: argv.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn file_config(temp: &TempDir) -> Config {
        Config {
            lock_dir: temp.path().to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn command_string_is_split_with_shell_rules() {
        let args = ExecArgs {
            command_line: Some("echo 'hello world' done".to_string()),
            ..exec_args("x", &[])
        };
        assert_eq!(
            program_args(&args).unwrap(),
            vec!["echo", "hello world", "done"]
        );
    }

    #[test]
    fn unbalanced_quotes_are_a_config_error() {
        let args = ExecArgs {
            command_line: Some("echo 'oops".to_string()),
            ..exec_args("x", &[])
        };
        assert!(matches!(
            program_args(&args),
            Err(CriticalSectionError::Config(_))
        ));
    }

    #[test]
    fn missing_command_is_rejected() {
        let err = program_args(&exec_args("x", &[])).unwrap_err();
        assert!(err.to_string().contains("no command given"));
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_of_child_is_propagated() {
        let temp = TempDir::new().unwrap();
        let code = cmd_exec(file_config(&temp), exec_args("job", &["sh", "-c", "exit 7"])).unwrap();
        assert_eq!(code, 7);
    }

    #[cfg(unix)]
    #[test]
    fn child_killed_by_signal_reports_128_plus_signal() {
        use std::os::unix::process::ExitStatusExt;

        // Raw wait status 9: terminated by SIGKILL.
        assert_eq!(child_exit_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(child_exit_code(ExitStatus::from_raw(3 << 8)), 3);

        let temp = TempDir::new().unwrap();
        let code = cmd_exec(
            file_config(&temp),
            exec_args("job", &["sh", "-c", "kill -TERM $$"]),
        )
        .unwrap();
        assert_eq!(code, exit_codes::SIGNAL_BASE + libc::SIGTERM);
    }

    #[cfg(unix)]
    #[test]
    fn section_is_free_again_after_exec() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            cmd_exec(file_config(&temp), exec_args("job", &["true"])).unwrap(),
            exit_codes::SUCCESS
        );

        let mut driver = FileDriver::new(temp.path()).unwrap();
        assert!(driver.acquire_lock("job").unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn busy_section_skips_command() {
        let temp = TempDir::new().unwrap();
        let mut holder = FileDriver::new(temp.path()).unwrap();
        assert!(holder.acquire_lock("job").unwrap());

        let marker = temp.path().join("ran");
        let script = format!("touch {}", marker.display());
        let code = cmd_exec(
            file_config(&temp),
            exec_args("job", &["sh", "-c", script.as_str()]),
        )
        .unwrap();

        assert_eq!(code, exit_codes::LOCK_FAILURE);
        assert!(!marker.exists());
    }

    #[test]
    fn missing_program_is_an_io_error() {
        let temp = TempDir::new().unwrap();
        let err = cmd_exec(
            file_config(&temp),
            exec_args("job", &["critsec-definitely-not-a-program"]),
        )
        .unwrap_err();
        assert!(matches!(err, CriticalSectionError::Io { .. }));
    }
}
