//! The `run` subcommand: bootstrap once, then run each project in turn.

use anyhow::{bail, Context, Result};
use pgtap_harness::{AggregateSummary, ProjectState, ScriptRunner, TapSummary, TestManager};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::formatter::{format_failures, format_project_header, format_project_result};

pub const FAILED_TESTS_MESSAGE: &str = "Failed tests. See the TAP outputs above.";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub project_dirs: Vec<PathBuf>,
    pub test_file: Option<PathBuf>,
    pub colorize: bool,
}

#[derive(Debug, Clone)]
pub struct ProjectReport {
    pub project: PathBuf,
    pub outputs: Vec<String>,
    pub aggregate: AggregateSummary,
}

/// Run every project and print its TAP output followed by a summary line.
///
/// All projects run even if an earlier one has failing tests; a harness error
/// stops the run immediately.
pub async fn run_projects<R, S>(
    manager: &mut TestManager<R, S>,
    options: &RunOptions,
    out: &mut impl Write,
) -> Result<Vec<ProjectReport>>
where
    R: ScriptRunner,
    S: ProjectState,
{
    if options.project_dirs.is_empty() {
        bail!("must supply at least one project directory");
    }

    manager
        .ensure_initialized()
        .await
        .context("Failed to bootstrap the harness")?;

    let mut reports = Vec::with_capacity(options.project_dirs.len());
    for project in &options.project_dirs {
        let report = run_project(manager, project, options, out).await?;
        reports.push(report);
    }
    Ok(reports)
}

async fn run_project<R, S>(
    manager: &TestManager<R, S>,
    project: &Path,
    options: &RunOptions,
    out: &mut impl Write,
) -> Result<ProjectReport>
where
    R: ScriptRunner,
    S: ProjectState,
{
    info!(project = %project.display(), "running project tests");
    let outputs = manager
        .execute_project_test(project, options.test_file.as_deref())
        .await
        .with_context(|| format!("Failed to run tests of {}", project.display()))?;

    writeln!(out, "{}\n", format_project_header(project, options.colorize))?;
    let summaries: Vec<TapSummary> = outputs.iter().map(|o| TapSummary::parse(o)).collect();
    for (output, summary) in outputs.iter().zip(&summaries) {
        writeln!(out, "{output}")?;
        for line in format_failures(summary, options.colorize) {
            writeln!(out, "{line}")?;
        }
    }

    let aggregate = TapSummary::merge(&summaries);
    writeln!(
        out,
        "{}",
        format_project_result(project, &aggregate, options.colorize)
    )?;

    Ok(ProjectReport {
        project: project.to_path_buf(),
        outputs,
        aggregate,
    })
}

/// Error out if any project reported a failed, missing or bailed-out test.
pub fn check_reports(reports: &[ProjectReport]) -> Result<()> {
    if reports.iter().all(|report| report.aggregate.is_success()) {
        Ok(())
    } else {
        bail!(FAILED_TESTS_MESSAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pgtap_harness::{BootstrapScripts, HarnessResult};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    /// Answers each script with canned TAP keyed by file name.
    #[derive(Clone, Default)]
    struct CannedRunner {
        executed: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ScriptRunner for CannedRunner {
        async fn run_script(&self, script: &Path) -> HarnessResult<String> {
            let name = script.file_name().unwrap().to_string_lossy().into_owned();
            self.executed.lock().unwrap().push(name.clone());
            Ok(match name.as_str() {
                "test_fail.sql" => "1..2\nok 1 - first\nnot ok 2 - second\n".to_string(),
                _ => "1..1\nok 1 - fine\n".to_string(),
            })
        }
    }

    struct NoState;

    #[async_trait]
    impl ProjectState for NoState {
        async fn set_project_path(&self, _path: &Path) -> HarnessResult<()> {
            Ok(())
        }

        async fn set_virtual_env_dir(&self, _path: &Path) -> HarnessResult<()> {
            Ok(())
        }

        async fn project_paths(&self) -> HarnessResult<Vec<Option<String>>> {
            Ok(Vec::new())
        }
    }

    fn project(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "SELECT 1;").unwrap();
        }
        dir
    }

    fn manager(runner: CannedRunner) -> TestManager<CannedRunner, NoState> {
        TestManager::new(runner, NoState)
            .with_bootstrap_scripts(BootstrapScripts::from_scripts([("base.sql", "SELECT 1;")]))
    }

    fn options(dirs: &[&Path]) -> RunOptions {
        RunOptions {
            project_dirs: dirs.iter().map(|d| d.to_path_buf()).collect(),
            test_file: None,
            colorize: false,
        }
    }

    #[tokio::test]
    async fn test_passing_project_prints_tap_and_summary() {
        let passing = project(&["test/test_ok.sql"]);
        let runner = CannedRunner::default();
        let mut manager = manager(runner.clone());
        let mut out = Vec::new();

        let reports = run_projects(&mut manager, &options(&[passing.path()]), &mut out)
            .await
            .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("project test summary:"));
        assert!(printed.contains("ok 1 - fine"));
        assert!(printed.contains("PASS"));
        assert!(check_reports(&reports).is_ok());
        assert_eq!(
            *runner.executed.lock().unwrap(),
            vec!["base.sql", "test_ok.sql"]
        );
    }

    #[tokio::test]
    async fn test_failures_in_one_project_do_not_stop_the_next() {
        let failing = project(&["test/test_fail.sql"]);
        let passing = project(&["tests/test_ok.sql"]);
        let mut manager = manager(CannedRunner::default());
        let mut out = Vec::new();

        let reports = run_projects(
            &mut manager,
            &options(&[failing.path(), passing.path()]),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].aggregate.failed, 1);
        assert!(reports[1].aggregate.is_success());

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("  not ok 2 - second"));

        let err = check_reports(&reports).unwrap_err();
        assert_eq!(err.to_string(), FAILED_TESTS_MESSAGE);
    }

    #[tokio::test]
    async fn test_missing_project_is_an_error() {
        let mut manager = manager(CannedRunner::default());
        let mut out = Vec::new();

        let err = run_projects(
            &mut manager,
            &options(&[Path::new("/nonexistent/project")]),
            &mut out,
        )
        .await
        .unwrap_err();

        assert!(format!("{err:#}").contains("/nonexistent/project"));
    }

    #[tokio::test]
    async fn test_no_projects_is_an_error() {
        let mut manager = manager(CannedRunner::default());
        let mut out = Vec::new();
        assert!(run_projects(&mut manager, &options(&[]), &mut out)
            .await
            .is_err());
    }
}
