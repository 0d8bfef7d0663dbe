//! Bootstrapping the instance and running a project's test scripts.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::bootstrap::BootstrapScripts;
use crate::config::HarnessConfig;
use crate::discovery::ProjectTestDir;
use crate::error::{HarnessError, HarnessResult};
use crate::query::{HarnessStateStore, ProjectState, QueryHelper};
use crate::script::{Psql, ScriptRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Uninitialized,
    Initializing,
    Initialized,
}

/// Runs project test scripts against a started harness.
///
/// Bootstrap scripts are executed once per manager, on the first call to
/// [`ensure_initialized`](Self::ensure_initialized). Test scripts are run
/// one at a time in discovery order and their raw output is returned as is.
pub struct TestManager<R = Psql, S = HarnessStateStore> {
    runner: R,
    state_store: S,
    bootstrap: BootstrapScripts,
    virtual_env: Option<PathBuf>,
    state: BootstrapState,
}

impl TestManager<Psql, HarnessStateStore> {
    /// `psql` for scripts and the query helper for harness state, both
    /// connecting as `user` (or the configured / ambient user).
    pub fn from_config(config: &HarnessConfig, user: Option<&str>) -> HarnessResult<Self> {
        let runner = Psql::from_config(config, user)?;
        let store = HarnessStateStore::new(QueryHelper::new(config, user)?);
        Ok(Self::new(runner, store).with_virtual_env(config.virtual_env_dir()))
    }
}

impl<R: ScriptRunner, S: ProjectState> TestManager<R, S> {
    pub fn new(runner: R, state_store: S) -> Self {
        Self {
            runner,
            state_store,
            bootstrap: BootstrapScripts::bundled(),
            virtual_env: None,
            state: BootstrapState::Uninitialized,
        }
    }

    pub fn with_bootstrap_scripts(mut self, scripts: BootstrapScripts) -> Self {
        self.bootstrap = scripts;
        self
    }

    pub fn with_virtual_env(mut self, dir: Option<PathBuf>) -> Self {
        self.virtual_env = dir;
        self
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == BootstrapState::Initialized
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run the bootstrap scripts unless that already succeeded.
    ///
    /// A failing script leaves the manager uninitialized, so the next call
    /// runs the whole set again.
    pub async fn ensure_initialized(&mut self) -> HarnessResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        self.state = BootstrapState::Initializing;
        match self.run_bootstrap().await {
            Ok(()) => {
                self.state = BootstrapState::Initialized;
                info!("harness bootstrapped");
                Ok(())
            }
            Err(err) => {
                self.state = BootstrapState::Uninitialized;
                Err(err)
            }
        }
    }

    async fn run_bootstrap(&self) -> HarnessResult<()> {
        let staging = tempfile::tempdir()?;
        for script in self.bootstrap.materialize(staging.path())? {
            debug!(script = %script.display(), "running bootstrap script");
            self.runner.run_script(&script).await?;
        }
        Ok(())
    }

    /// Run the test scripts of `project_dir`, or only the one whose path ends
    /// with `test_file` (relative to the test subdirectory).
    ///
    /// Returns the raw output of each executed script, in discovery order. A
    /// project without any `test_*.sql` script yields an empty list.
    #[instrument(skip(self, project_dir), fields(project = %project_dir.display()))]
    pub async fn execute_project_test(
        &self,
        project_dir: &Path,
        test_file: Option<&Path>,
    ) -> HarnessResult<Vec<String>> {
        if !project_dir.exists() {
            return Err(HarnessError::io(format!(
                "Project directory {} does not exist",
                project_dir.display()
            )));
        }
        let project = ProjectTestDir::resolve(project_dir)?;

        if !project.has_scripts()? {
            warn!(
                test_dir = %project.test_dir().display(),
                "no test_*.sql scripts found, nothing to run"
            );
            return Ok(Vec::new());
        }

        if let Some(test_file) = test_file {
            let requested = project.test_dir().join(test_file);
            if !requested.exists() {
                return Err(HarnessError::io(format!(
                    "Test file {} does not exist",
                    requested.display()
                )));
            }
        }

        self.set_project_dir(project.root()).await?;
        match &self.virtual_env {
            Some(venv) => self.state_store.set_virtual_env_dir(venv).await?,
            None => warn!(
                "no virtual environment detected; in-engine scripts that import project code may fail"
            ),
        }

        let mut outputs = Vec::new();
        for script in project.scripts()? {
            let script = script?;
            match test_file {
                Some(wanted) if !script.ends_with(wanted) => {
                    warn!(script = %script.display(), "skipping, only running {}", wanted.display());
                }
                _ => {
                    info!(script = %script.display(), "running test script");
                    outputs.push(self.runner.run_script(&script).await?);
                }
            }
        }
        Ok(outputs)
    }

    /// Whether `project_dir` has a test subdirectory with at least one script.
    pub fn is_valid_project_test_dir(&self, project_dir: &Path) -> HarnessResult<bool> {
        ProjectTestDir::resolve(project_dir)?.has_scripts()
    }

    /// Record `project_dir` (made absolute) inside the harness.
    pub async fn set_project_dir(&self, project_dir: &Path) -> HarnessResult<()> {
        if !project_dir.exists() {
            return Err(HarnessError::io(format!(
                "Project directory {} does not exist",
                project_dir.display()
            )));
        }
        let absolute = std::path::absolute(project_dir)?;
        debug!(project = %absolute.display(), "recording project directory");
        self.state_store.set_project_path(&absolute).await
    }

    /// The project directory recorded inside the harness, if any.
    pub async fn project_dir(&self) -> HarnessResult<Vec<PathBuf>> {
        Ok(self
            .state_store
            .project_paths()
            .await?
            .into_iter()
            .flatten()
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .collect())
    }
}
