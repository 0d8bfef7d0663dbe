//! SQL scripts that prepare a fresh instance before any test runs.
//!
//! The default set ships inside the library (see `glue/`). `base.sql` installs
//! the state table and functions the others depend on, so it always runs
//! first; the remaining scripts run in lexicographic order.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use rust_embed::RustEmbed;

use crate::error::{HarnessError, HarnessResult};

pub const BASE_SCRIPT: &str = "base.sql";

#[derive(RustEmbed)]
#[folder = "glue/"]
struct GlueAssets;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapScript {
    pub name: String,
    pub contents: Cow<'static, [u8]>,
}

#[derive(Debug, Clone, Default)]
pub struct BootstrapScripts {
    scripts: Vec<BootstrapScript>,
}

impl BootstrapScripts {
    /// The scripts compiled into the library.
    pub fn bundled() -> Self {
        let scripts = GlueAssets::iter()
            .filter_map(|name| {
                GlueAssets::get(&name).map(|file| BootstrapScript {
                    name: name.into_owned(),
                    contents: file.data,
                })
            })
            .collect();
        Self { scripts }
    }

    /// Every `.sql` file directly inside `dir`.
    pub fn from_dir(dir: &Path) -> HarnessResult<Self> {
        let entries = std::fs::read_dir(dir).map_err(|err| HarnessError::Io {
            message: format!("cannot list bootstrap scripts in {}: {err}", dir.display()),
            source: Some(err),
        })?;

        let mut scripts = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("sql") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            scripts.push(BootstrapScript {
                name: name.to_string(),
                contents: Cow::Owned(std::fs::read(&path)?),
            });
        }
        Ok(Self { scripts })
    }

    pub fn from_scripts<I, N, C>(scripts: I) -> Self
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<Vec<u8>>,
    {
        Self {
            scripts: scripts
                .into_iter()
                .map(|(name, contents)| BootstrapScript {
                    name: name.into(),
                    contents: Cow::Owned(contents.into()),
                })
                .collect(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.scripts.iter().map(|s| s.name.as_str()).collect()
    }

    /// `base.sql` first, then the rest sorted by name.
    pub fn execution_order(&self) -> HarnessResult<Vec<&BootstrapScript>> {
        let base = self
            .scripts
            .iter()
            .find(|s| s.name == BASE_SCRIPT)
            .ok_or_else(|| {
                HarnessError::Environment(format!(
                    "Could not find the {BASE_SCRIPT} bootstrap script, the harness cannot be initialized"
                ))
            })?;

        let mut rest: Vec<&BootstrapScript> = self
            .scripts
            .iter()
            .filter(|s| s.name != BASE_SCRIPT && s.name.ends_with(".sql"))
            .collect();
        rest.sort_by(|a, b| a.name.cmp(&b.name));

        let mut ordered = Vec::with_capacity(rest.len() + 1);
        ordered.push(base);
        ordered.extend(rest);
        Ok(ordered)
    }

    /// Write the scripts into `dir` and return their paths in execution order.
    pub fn materialize(&self, dir: &Path) -> HarnessResult<Vec<PathBuf>> {
        self.execution_order()?
            .into_iter()
            .map(|script| {
                let path = dir.join(&script.name);
                std::fs::write(&path, &script.contents).map_err(|err| HarnessError::Io {
                    message: format!("cannot write bootstrap script {}: {err}", path.display()),
                    source: Some(err),
                })?;
                Ok(path)
            })
            .collect()
    }
}
