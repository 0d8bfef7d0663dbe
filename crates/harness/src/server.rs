//! Lifecycle of the ephemeral PostgreSQL instance.
//!
//! One [`PostgresHarness`] owns one data directory. `start` creates the
//! directory, runs `initdb`, starts the server bound to local addresses only
//! and creates the owner's default database; `stop` shuts the server down and
//! always removes the data directory.
//!
//! # Example
//!
//! ```no_run
//! use pgtap_harness::{HarnessConfig, PostgresHarness};
//!
//! #[tokio::main]
//! async fn main() -> pgtap_harness::HarnessResult<()> {
//!     let harness = PostgresHarness::new(HarnessConfig::default());
//!     harness.start(None).await?;
//!     assert!(harness.is_running().await?);
//!     harness.stop().await
//! }
//! ```

use std::future::Future;
use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::api::{
    BindOptions, CommandExit, InstanceController, PgCtl, ShutdownMode, PG_CTL_NOT_RUNNING,
};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};

/// Handle on the ephemeral instance bound to [`HarnessConfig::data_dir`].
///
/// Running state is never cached: every [`is_running`](Self::is_running)
/// call probes the controller. Dropping the handle does not stop the
/// instance; call [`stop`](Self::stop) or use [`with_harness`].
#[derive(Debug)]
pub struct PostgresHarness<C = PgCtl> {
    config: HarnessConfig,
    controller: C,
}

impl PostgresHarness<PgCtl> {
    pub fn new(config: HarnessConfig) -> Self {
        let controller = PgCtl::from_config(&config);
        Self { config, controller }
    }
}

impl<C: InstanceController> PostgresHarness<C> {
    pub fn with_controller(config: HarnessConfig, controller: C) -> Self {
        Self { config, controller }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    fn bind_options(&self) -> BindOptions {
        BindOptions::from_config(&self.config)
    }

    /// Initialize and start the instance, then create the default database
    /// owned by `owner_user` (or the configured / ambient user).
    ///
    /// If `initdb` or the server start fails the data directory is removed so
    /// the next attempt starts clean. A server start that times out may have
    /// left a postmaster behind, so it is shut down with `-m immediate` first.
    /// If only the database creation fails the server is left running and the
    /// caller must [`stop`](Self::stop) it.
    pub async fn start(&self, owner_user: Option<&str>) -> HarnessResult<()> {
        let owner = self.config.resolve_owner(owner_user)?;
        let data_dir = self.data_dir();

        std::fs::create_dir_all(data_dir)?;
        if std::fs::read_dir(data_dir)?.next().is_some() {
            return Err(HarnessError::State(format!(
                "the harness dir {} is not empty, did you forget to stop the harness?",
                data_dir.display()
            )));
        }

        info!(data_dir = %data_dir.display(), "initializing postgres harness");
        let init = self.controller.initialize(data_dir).await;
        self.remove_on_failure(init, "There was an error initializing the postgres DB.")?;

        info!(port = self.config.port, "starting postgres harness");
        let started = self.controller.start(data_dir, &self.bind_options()).await;
        if matches!(started, Err(HarnessError::Timeout { .. })) {
            self.stop_immediately().await;
        }
        self.remove_on_failure(started, "There was an error starting the postgres DB.")?;

        if let Err(err) = self.create_default_database(&owner).await {
            error!(
                %err,
                "failed to create the default database; the harness is still running \
                 and should be shut down with `stop`"
            );
            return Err(err);
        }

        info!(owner = %owner, "postgres harness is ready");
        Ok(())
    }

    /// Stop the instance if it is running and remove the data directory.
    ///
    /// The directory is removed on every path, including a failed status
    /// probe or a failed `pg_ctl stop`; the stop failure is reported after the
    /// removal has been attempted. A missing data directory is a no-op.
    pub async fn stop(&self) -> HarnessResult<()> {
        let data_dir = self.data_dir();
        if !data_dir.exists() {
            debug!(data_dir = %data_dir.display(), "no harness data dir, nothing to stop");
            return Ok(());
        }

        let stopped = self.stop_instance().await;
        let removed = remove_data_dir(data_dir);

        stopped?;
        removed?;
        info!(data_dir = %data_dir.display(), "postgres harness stopped");
        Ok(())
    }

    async fn stop_instance(&self) -> HarnessResult<()> {
        if !self.is_running().await? {
            debug!("postgres harness is not running, only cleaning up");
            return Ok(());
        }
        let exit = self.controller.stop(self.data_dir(), None).await?;
        check_exit(exit, "There was an issue stopping postgres.")
    }

    async fn stop_immediately(&self) {
        warn!("server start timed out, shutting down whatever was launched");
        match self
            .controller
            .stop(self.data_dir(), Some(ShutdownMode::Immediate))
            .await
        {
            Ok(exit) if !exit.success() => {
                debug!(code = exit.code, "immediate shutdown found nothing to stop")
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "immediate shutdown after a timed out start failed"),
        }
    }

    pub async fn is_running(&self) -> HarnessResult<bool> {
        if !self.data_dir().exists() {
            return Ok(false);
        }
        let exit = self.controller.status(self.data_dir()).await?;
        match exit.code {
            0 => Ok(true),
            PG_CTL_NOT_RUNNING => Ok(false),
            code => Err(HarnessError::subprocess(
                "There was an issue in determining the postgres process status.",
                code,
                exit.command,
            )),
        }
    }

    /// Create the database named after `owner_user`, owned by that role.
    pub async fn create_default_database(&self, owner_user: &str) -> HarnessResult<()> {
        if owner_user.is_empty() {
            return Err(HarnessError::Value(
                "user name argument must be a non-empty string".into(),
            ));
        }
        let exit = self
            .controller
            .create_database(owner_user, &self.bind_options())
            .await?;
        check_exit(exit, "There was an issue creating the default DB.")
    }

    fn remove_on_failure(
        &self,
        outcome: HarnessResult<CommandExit>,
        message: &str,
    ) -> HarnessResult<()> {
        let result = outcome.and_then(|exit| check_exit(exit, message));
        if result.is_err() {
            // No server is left running, so the directory can go.
            if let Err(err) = remove_data_dir(self.data_dir()) {
                warn!(%err, "failed to clean up harness data dir");
            }
        }
        result
    }
}

fn check_exit(exit: CommandExit, message: &str) -> HarnessResult<()> {
    if exit.success() {
        Ok(())
    } else {
        Err(HarnessError::subprocess(message, exit.code, exit.command))
    }
}

fn remove_data_dir(data_dir: &Path) -> HarnessResult<()> {
    match std::fs::remove_dir_all(data_dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(HarnessError::Io {
            message: format!(
                "failed to remove harness data dir {}: {err}",
                data_dir.display()
            ),
            source: Some(err),
        }),
    }
}

/// Run `f` against a freshly started harness and stop it afterwards.
///
/// The harness is stopped whether `f` succeeds or fails, and also when
/// `start` itself fails part-way. A start rejected up front (missing
/// identity, non-empty data dir) leaves the data dir alone. The first error
/// wins.
///
/// # Example
///
/// ```no_run
/// use pgtap_harness::{with_harness, HarnessConfig, PostgresHarness};
///
/// #[tokio::main]
/// async fn main() -> pgtap_harness::HarnessResult<()> {
///     let harness = PostgresHarness::new(HarnessConfig::default());
///     with_harness(&harness, None, || async {
///         // run tests here
///         Ok(())
///     })
///     .await
/// }
/// ```
pub async fn with_harness<C, F, Fut, T>(
    harness: &PostgresHarness<C>,
    owner_user: Option<&str>,
    f: F,
) -> HarnessResult<T>
where
    C: InstanceController,
    F: FnOnce() -> Fut,
    Fut: Future<Output = HarnessResult<T>>,
{
    match harness.start(owner_user).await {
        Ok(()) => {}
        // Nothing was started, and the data dir may belong to another run.
        Err(err @ (HarnessError::State(_) | HarnessError::Configuration(_))) => return Err(err),
        Err(err) => {
            if let Err(stop_err) = harness.stop().await {
                warn!(%stop_err, "failed to stop harness after a failed start");
            }
            return Err(err);
        }
    }

    let result = f().await;
    let stopped = harness.stop().await;

    let value = result?;
    stopped?;
    Ok(value)
}
