//! Test script discovery inside a project directory.

use std::path::{Path, PathBuf};

use glob::{Pattern, Paths};

use crate::error::{HarnessError, HarnessResult};

/// Subdirectories searched for test scripts, in order of preference.
pub const TEST_DIR_NAMES: [&str; 2] = ["test", "tests"];

pub const TEST_SCRIPT_PREFIX: &str = "test_";
pub const TEST_SCRIPT_EXTENSION: &str = ".sql";

/// Whether `path`'s file name is `test_*.sql`.
pub fn is_test_script(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with(TEST_SCRIPT_PREFIX) && name.ends_with(TEST_SCRIPT_EXTENSION))
        .unwrap_or(false)
}

/// Lazily walks a test directory, yielding qualifying scripts in path order.
///
/// Unreadable entries end the walk with an error item rather than being
/// silently dropped.
pub struct TestScripts {
    paths: Option<Paths>,
}

impl TestScripts {
    fn empty() -> Self {
        Self { paths: None }
    }
}

impl Iterator for TestScripts {
    type Item = HarnessResult<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        let paths = self.paths.as_mut()?;
        loop {
            match paths.next()? {
                Ok(path) if path.is_file() && is_test_script(&path) => return Some(Ok(path)),
                Ok(_) => continue,
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}

/// Recursively discover `test_*.sql` scripts under `test_dir`.
///
/// A missing or empty directory yields nothing. The iterator is lazy; call
/// again to walk the directory afresh.
pub fn discover_test_scripts(test_dir: impl AsRef<Path>) -> HarnessResult<TestScripts> {
    let test_dir = test_dir.as_ref();
    if test_dir.as_os_str().is_empty() {
        return Err(HarnessError::Value(
            "a test directory is required to discover test scripts".into(),
        ));
    }
    if !test_dir.is_dir() {
        return Ok(TestScripts::empty());
    }

    let root = Pattern::escape(&test_dir.to_string_lossy());
    let pattern = format!("{root}/**/{TEST_SCRIPT_PREFIX}*{TEST_SCRIPT_EXTENSION}");
    Ok(TestScripts {
        paths: Some(glob::glob(&pattern)?),
    })
}

/// A project root together with its recognized test subdirectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTestDir {
    root: PathBuf,
    test_dir: PathBuf,
}

impl ProjectTestDir {
    /// Locate `test/` (preferred) or `tests/` under `project_dir`.
    pub fn resolve(project_dir: impl AsRef<Path>) -> HarnessResult<Self> {
        let project_dir = project_dir.as_ref();
        let root = std::path::absolute(project_dir).map_err(|err| HarnessError::Io {
            message: format!(
                "cannot resolve project directory {}: {err}",
                project_dir.display()
            ),
            source: Some(err),
        })?;

        let test_dir = TEST_DIR_NAMES
            .iter()
            .map(|name| root.join(name))
            .find(|candidate| candidate.is_dir())
            .ok_or_else(|| {
                HarnessError::io(format!(
                    "No test/ or tests/ directory found under {}",
                    root.display()
                ))
            })?;

        Ok(Self { root, test_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn test_dir(&self) -> &Path {
        &self.test_dir
    }

    pub fn scripts(&self) -> HarnessResult<TestScripts> {
        discover_test_scripts(&self.test_dir)
    }

    /// Collect the scripts eagerly.
    pub fn script_list(&self) -> HarnessResult<Vec<PathBuf>> {
        self.scripts()?.collect()
    }

    pub fn has_scripts(&self) -> HarnessResult<bool> {
        self.scripts()?.next().transpose().map(|first| first.is_some())
    }
}
