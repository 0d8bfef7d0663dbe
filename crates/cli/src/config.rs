//! Configuration file lookup and command-line overrides

use anyhow::{bail, Context, Result};
use pgtap_harness::HarnessConfig;
use std::path::{Path, PathBuf};

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let config_dir = directories::ProjectDirs::from("org", "pgtap", "pgtap")
        .context("Could not determine config directory")?
        .config_dir()
        .to_path_buf();

    Ok(config_dir)
}

/// Get the default config file path
pub fn config_file_path() -> Result<PathBuf> {
    let mut path = config_dir()?;
    path.push("harness.toml");
    Ok(path)
}

/// Load the harness configuration.
///
/// An explicitly given file must exist. Otherwise the default config file is
/// used when present, and built-in defaults when not.
pub fn load_config(explicit: Option<&Path>) -> Result<HarnessConfig> {
    let config_path = match explicit {
        Some(path) if !path.exists() => bail!("Config file not found: {}", path.display()),
        Some(path) => path.to_path_buf(),
        None => match config_file_path() {
            Ok(path) if path.exists() => path,
            _ => return Ok(HarnessConfig::default()),
        },
    };

    HarnessConfig::load(&config_path)
        .with_context(|| format!("Failed to load config file: {}", config_path.display()))
}

/// Values given on the command line (or via `PGTAP_*` variables) win over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Overrides {
    pub fn apply(self, mut config: HarnessConfig) -> HarnessConfig {
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(user) = self.user {
            config.owner_user = Some(user);
        }
        if let Some(timeout) = self.timeout_secs {
            config.command_timeout_secs = Some(timeout);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_paths() {
        // Should not panic
        let _ = config_dir();
        let _ = config_file_path();
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config(Some(&missing)).is_err());
    }

    #[test]
    fn test_explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        std::fs::write(&path, "port = 6543\nowner_user = \"ci\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();

        assert_eq!(config.port, 6543);
        assert_eq!(config.owner_user.as_deref(), Some("ci"));
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "port = [").unwrap();

        let err = load_config(Some(&path)).unwrap_err();

        assert!(format!("{err:#}").contains("broken.toml"));
    }

    #[test]
    fn test_overrides_win() {
        let base = HarnessConfig {
            port: 6543,
            owner_user: Some("file".into()),
            ..Default::default()
        };
        let config = Overrides {
            data_dir: Some(PathBuf::from("/tmp/pgtap-data")),
            port: Some(7000),
            user: None,
            timeout_secs: Some(5),
        }
        .apply(base);

        assert_eq!(config.data_dir, PathBuf::from("/tmp/pgtap-data"));
        assert_eq!(config.port, 7000);
        assert_eq!(config.owner_user.as_deref(), Some("file"));
        assert_eq!(config.command_timeout_secs, Some(5));
    }
}
