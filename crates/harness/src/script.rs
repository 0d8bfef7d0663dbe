//! Running a single SQL script against the harness.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::api::{exit_code, CommandLine, PsqlOptions};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};

/// Captured result of one script run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub script_path: PathBuf,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ScriptOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// The raw stdout on success, otherwise a [`HarnessError::Subprocess`]
    /// whose command is the script path and whose message carries stderr.
    pub fn into_result(self) -> HarnessResult<String> {
        if self.succeeded() {
            return Ok(self.stdout);
        }
        Err(HarnessError::subprocess(
            format!(
                "Error executing a sql script. Process output (may be empty): {}",
                self.stderr
            ),
            self.exit_code,
            self.script_path.display().to_string(),
        ))
    }
}

/// Executes one script file and hands back its raw output.
///
/// The output is opaque here; for test scripts it is TAP text.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run_script(&self, script: &Path) -> HarnessResult<String>;
}

/// [`ScriptRunner`] backed by `psql`.
///
/// Scripts run with `ON_ERROR_STOP` and `ON_ERROR_ROLLBACK`, unaligned tuple
/// output and no pager. Unlike the `pg_ctl` calls, output is captured rather
/// than streamed.
#[derive(Debug, Clone)]
pub struct Psql {
    program: PathBuf,
    host: String,
    port: u16,
    user: String,
    timeout: Option<Duration>,
}

impl Psql {
    /// Connects as `user` (or the configured / ambient user) to the database
    /// of the same name, which is what `PostgresHarness::start` creates.
    pub fn from_config(config: &HarnessConfig, user: Option<&str>) -> HarnessResult<Self> {
        Ok(Self {
            program: config.psql.clone(),
            host: config.host.clone(),
            port: config.port,
            user: config.resolve_owner(user)?,
            timeout: config.command_timeout(),
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    fn command_line(&self, script: &Path) -> CommandLine {
        let options = PsqlOptions {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            dbname: self.user.clone(),
            file: script.to_path_buf(),
        };
        CommandLine::new(&self.program, &options)
    }

    /// Run `script` and return everything it produced, successful or not.
    pub async fn capture(&self, script: &Path) -> HarnessResult<ScriptOutput> {
        let output = self
            .command_line(script)
            .run_captured(self.timeout)
            .await?;
        let result = ScriptOutput {
            script_path: script.to_path_buf(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: exit_code(&output.status),
        };
        debug!(
            script = %script.display(),
            exit_code = result.exit_code,
            stdout = %result.stdout,
            "script finished"
        );
        Ok(result)
    }
}

#[async_trait]
impl ScriptRunner for Psql {
    async fn run_script(&self, script: &Path) -> HarnessResult<String> {
        self.capture(script).await?.into_result()
    }
}
