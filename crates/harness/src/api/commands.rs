//! Turning typed options into command lines and running them.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

/// Convert options to CLI arguments.
pub(crate) trait ToArgs {
    fn to_args(&self) -> Vec<String>;
}

/// Helper to add a flag if condition is true.
pub(crate) fn add_flag(args: &mut Vec<String>, flag: &str, condition: bool) {
    if condition {
        args.push(flag.to_string());
    }
}

/// Helper to add an option with a value.
pub(crate) fn add_option<T: AsRef<str>>(args: &mut Vec<String>, flag: &str, value: &Option<T>) {
    if let Some(v) = value {
        args.push(flag.to_string());
        args.push(v.as_ref().to_string());
    }
}

/// Helper to add a required option.
pub(crate) fn add_required<T: AsRef<str>>(args: &mut Vec<String>, flag: &str, value: T) {
    args.push(flag.to_string());
    args.push(value.as_ref().to_string());
}

/// Helper to add a path-valued option.
pub(crate) fn add_path(args: &mut Vec<String>, flag: &str, value: &Path) {
    args.push(flag.to_string());
    args.push(value.display().to_string());
}

/// A program plus its arguments, printable for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandLine {
    pub(crate) fn new(program: impl Into<PathBuf>, options: &impl ToArgs) -> Self {
        Self {
            program: program.into(),
            args: options.to_args(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true);
        cmd
    }

    /// Run with inherited stdio so the operator sees the output live.
    pub(crate) async fn run_inherited(&self, timeout: Option<Duration>) -> HarnessResult<i32> {
        debug!(command = %self, "running");
        let mut cmd = self.command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        let status = with_timeout(self, timeout, cmd.status()).await?;
        Ok(exit_code(&status))
    }

    /// Run with stdout and stderr captured separately.
    pub(crate) async fn run_captured(&self, timeout: Option<Duration>) -> HarnessResult<Output> {
        debug!(command = %self, "running (captured)");
        let mut cmd = self.command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        with_timeout(self, timeout, cmd.output()).await
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Exit code of a finished process; `-1` when it was terminated by a signal.
pub(crate) fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

async fn with_timeout<T>(
    command: &CommandLine,
    timeout: Option<Duration>,
    fut: impl Future<Output = std::io::Result<T>>,
) -> HarnessResult<T> {
    let result = match timeout {
        // Dropping the future drops the child, which kills it (kill_on_drop).
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| HarnessError::Timeout {
                command: command.to_string(),
                timeout: limit,
            })?,
        None => fut.await,
    };
    result.map_err(|err| HarnessError::Io {
        message: format!("failed to run `{command}`: {err}"),
        source: Some(err),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Raw(Vec<&'static str>);

    impl ToArgs for Raw {
        fn to_args(&self) -> Vec<String> {
            self.0.iter().map(|s| s.to_string()).collect()
        }
    }

    #[test]
    fn test_arg_helpers() {
        let mut args = Vec::new();
        add_flag(&mut args, "-w", true);
        add_flag(&mut args, "--never", false);
        add_option(&mut args, "-m", &Some("fast"));
        add_option::<&str>(&mut args, "-o", &None);
        add_required(&mut args, "-U", "alice");
        add_path(&mut args, "-D", Path::new("/tmp/data"));

        assert_eq!(args, vec!["-w", "-m", "fast", "-U", "alice", "-D", "/tmp/data"]);
    }

    #[test]
    fn test_display_quotes_whitespace() {
        let line = CommandLine::new("pg_ctl", &Raw(vec!["start", "-o", "-h localhost"]));
        assert_eq!(line.to_string(), "pg_ctl start -o '-h localhost'");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captured_separates_streams() {
        let line = CommandLine::new("sh", &Raw(vec!["-c", "echo out; echo err >&2; exit 3"]));
        let output = line.run_captured(None).await.unwrap();

        assert_eq!(exit_code(&output.status), 3);
        assert_eq!(String::from_utf8_lossy(&output.stdout), "out\n");
        assert_eq!(String::from_utf8_lossy(&output.stderr), "err\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_slow_command() {
        let line = CommandLine::new("sh", &Raw(vec!["-c", "sleep 5"]));
        let err = line
            .run_inherited(Some(Duration::from_millis(100)))
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::Timeout { .. }));
        assert_eq!(err.command(), Some("sh -c 'sleep 5'"));
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let line = CommandLine::new("/nonexistent/pgtap-harness-binary", &Raw(vec![]));
        let err = line.run_inherited(None).await.unwrap_err();
        assert!(matches!(err, HarnessError::Io { .. }));
    }
}
