//! Harness configuration.
//!
//! Every value that used to be a process-wide constant (data directory,
//! binding options, program paths) lives here and is threaded through the
//! components explicitly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// Directory name used under the system temp dir when no data dir is configured.
pub const DEFAULT_DATA_DIR_NAME: &str = "__rs_tap_process_flags";

/// Environment variable consulted when no owner user is given explicitly.
pub const AMBIENT_USER_VAR: &str = "USER";

/// Environment variable naming the active virtual environment, if any.
pub const VIRTUAL_ENV_VAR: &str = "VIRTUAL_ENV";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Data directory of the ephemeral instance. Must be empty before start.
    pub data_dir: PathBuf,
    /// Role that owns the default database. Falls back to `$USER`.
    pub owner_user: Option<String>,
    /// Address the instance listens on. Only local addresses make sense here.
    pub host: String,
    pub port: u16,
    /// Directory for the instance's unix-domain socket.
    pub socket_dir: PathBuf,
    pub pg_ctl: PathBuf,
    pub createdb: PathBuf,
    pub psql: PathBuf,
    /// Virtual environment recorded into the instance for in-engine scripts.
    /// Falls back to `$VIRTUAL_ENV`.
    pub virtual_env: Option<PathBuf>,
    /// Upper bound for every subprocess call. `None` waits forever.
    pub command_timeout_secs: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::temp_dir().join(DEFAULT_DATA_DIR_NAME),
            owner_user: None,
            host: "localhost".to_string(),
            port: 5432,
            socket_dir: PathBuf::from("/tmp"),
            pg_ctl: PathBuf::from("pg_ctl"),
            createdb: PathBuf::from("createdb"),
            psql: PathBuf::from("psql"),
            virtual_env: None,
            command_timeout_secs: None,
        }
    }
}

impl HarnessConfig {
    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> HarnessResult<Self> {
        toml::from_str(contents)
            .map_err(|err| HarnessError::Configuration(format!("invalid harness config: {err}")))
    }

    pub fn load(path: &Path) -> HarnessResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|err| HarnessError::Io {
            message: format!("failed to read harness config {}: {err}", path.display()),
            source: Some(err),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    /// Resolve the identity used to create and connect to the default database.
    ///
    /// Precedence: `explicit`, then [`HarnessConfig::owner_user`], then `$USER`.
    pub fn resolve_owner(&self, explicit: Option<&str>) -> HarnessResult<String> {
        resolve_identity(
            explicit.or(self.owner_user.as_deref()),
            std::env::var(AMBIENT_USER_VAR).ok(),
        )
    }

    pub fn virtual_env_dir(&self) -> Option<PathBuf> {
        self.virtual_env.clone().or_else(|| {
            std::env::var_os(VIRTUAL_ENV_VAR)
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from)
        })
    }
}

fn resolve_identity(explicit: Option<&str>, ambient: Option<String>) -> HarnessResult<String> {
    explicit
        .filter(|user| !user.is_empty())
        .map(str::to_string)
        .or(ambient.filter(|user| !user.is_empty()))
        .ok_or_else(|| {
            HarnessError::Configuration(format!(
                "no user given and ${AMBIENT_USER_VAR} is not set; \
                 the harness needs a role to create and connect to the default database"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = HarnessConfig::from_toml_str(
            r#"
            port = 55432
            owner_user = "tester"
            command_timeout_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 55432);
        assert_eq!(config.owner_user.as_deref(), Some("tester"));
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.host, "localhost");
        assert_eq!(config.pg_ctl, PathBuf::from("pg_ctl"));
        assert!(config.data_dir.ends_with(DEFAULT_DATA_DIR_NAME));
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = HarnessConfig::from_toml_str("port = \"not a number\"").unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
    }

    #[test]
    fn test_explicit_identity_wins() {
        let user = resolve_identity(Some("alice"), Some("bob".into())).unwrap();
        assert_eq!(user, "alice");
    }

    #[test]
    fn test_empty_identity_falls_back_to_ambient() {
        let user = resolve_identity(Some(""), Some("bob".into())).unwrap();
        assert_eq!(user, "bob");
    }

    #[test]
    fn test_missing_identity_is_configuration_error() {
        let err = resolve_identity(None, None).unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));

        let err = resolve_identity(None, Some(String::new())).unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
    }

    #[test]
    fn test_configured_owner_used_before_ambient() {
        let config = HarnessConfig {
            owner_user: Some("configured".into()),
            ..Default::default()
        };
        assert_eq!(config.resolve_owner(None).unwrap(), "configured");
        assert_eq!(config.resolve_owner(Some("explicit")).unwrap(), "explicit");
    }
}
