//! The instance controller: the external programs that initialize, start,
//! stop and probe a PostgreSQL data directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::commands::CommandLine;
use super::options::{
    BindOptions, CreateDbOptions, InitDbOptions, ShutdownMode, StartOptions, StatusOptions,
    StopOptions,
};
use crate::config::HarnessConfig;
use crate::error::HarnessResult;

/// Exit code `pg_ctl status` uses for "no server running".
pub const PG_CTL_NOT_RUNNING: i32 = 3;

/// How an external command finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExit {
    pub code: i32,
    /// The command as run, for error reporting.
    pub command: String,
}

impl CommandExit {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Process control for one PostgreSQL instance.
///
/// Implementations only report exit codes; deciding what a code means is up
/// to [`PostgresHarness`](crate::PostgresHarness). Output is streamed to the
/// caller's terminal, not captured.
#[async_trait]
pub trait InstanceController: Send + Sync {
    async fn initialize(&self, data_dir: &Path) -> HarnessResult<CommandExit>;

    async fn start(&self, data_dir: &Path, bind: &BindOptions) -> HarnessResult<CommandExit>;

    /// `mode` of `None` leaves the choice to `pg_ctl`.
    async fn stop(&self, data_dir: &Path, mode: Option<ShutdownMode>)
        -> HarnessResult<CommandExit>;

    /// `0` = running, [`PG_CTL_NOT_RUNNING`] = not running, anything else is a failure.
    async fn status(&self, data_dir: &Path) -> HarnessResult<CommandExit>;

    async fn create_database(&self, owner: &str, bind: &BindOptions)
        -> HarnessResult<CommandExit>;
}

/// [`InstanceController`] backed by `pg_ctl` and `createdb`.
#[derive(Debug, Clone)]
pub struct PgCtl {
    pg_ctl: PathBuf,
    createdb: PathBuf,
    timeout: Option<Duration>,
}

impl Default for PgCtl {
    fn default() -> Self {
        Self::from_config(&HarnessConfig::default())
    }
}

impl PgCtl {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            pg_ctl: config.pg_ctl.clone(),
            createdb: config.createdb.clone(),
            timeout: config.command_timeout(),
        }
    }

    async fn run(&self, line: CommandLine) -> HarnessResult<CommandExit> {
        let code = line.run_inherited(self.timeout).await?;
        Ok(CommandExit {
            code,
            command: line.to_string(),
        })
    }
}

#[async_trait]
impl InstanceController for PgCtl {
    async fn initialize(&self, data_dir: &Path) -> HarnessResult<CommandExit> {
        self.run(CommandLine::new(&self.pg_ctl, &InitDbOptions::new(data_dir)))
            .await
    }

    async fn start(&self, data_dir: &Path, bind: &BindOptions) -> HarnessResult<CommandExit> {
        self.run(CommandLine::new(
            &self.pg_ctl,
            &StartOptions::new(data_dir, bind),
        ))
        .await
    }

    async fn stop(
        &self,
        data_dir: &Path,
        mode: Option<ShutdownMode>,
    ) -> HarnessResult<CommandExit> {
        let options = StopOptions {
            mode,
            ..StopOptions::new(data_dir)
        };
        self.run(CommandLine::new(&self.pg_ctl, &options)).await
    }

    async fn status(&self, data_dir: &Path) -> HarnessResult<CommandExit> {
        let options = StatusOptions {
            data_dir: data_dir.to_path_buf(),
        };
        self.run(CommandLine::new(&self.pg_ctl, &options)).await
    }

    async fn create_database(
        &self,
        owner: &str,
        bind: &BindOptions,
    ) -> HarnessResult<CommandExit> {
        self.run(CommandLine::new(
            &self.createdb,
            &CreateDbOptions::new(owner, bind),
        ))
        .await
    }
}
