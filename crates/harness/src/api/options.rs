//! Option structs for the PostgreSQL programs the harness drives.
//!
//! Each command has a corresponding options struct that renders its own
//! argument list.

use std::path::{Path, PathBuf};

use super::commands::{add_flag, add_option, add_path, add_required, ToArgs};
use crate::config::HarnessConfig;

// ============================================================================
// Binding
// ============================================================================

/// Where the ephemeral instance listens. Only local addresses are used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindOptions {
    pub host: String,
    pub port: u16,
    /// Directory for the unix-domain socket.
    pub socket_dir: PathBuf,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            socket_dir: PathBuf::from("/tmp"),
        }
    }
}

impl BindOptions {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            socket_dir: config.socket_dir.clone(),
        }
    }

    /// Server options handed to `pg_ctl start -o`.
    ///
    /// These override `listen_addresses`, `unix_socket_directories` and `port`
    /// from whatever postgresql.conf the packaged `initdb` produced.
    pub fn server_options(&self) -> String {
        format!(
            "-h {} -k {} -p {}",
            quote_server_option(&self.host),
            quote_server_option(&self.socket_dir.display().to_string()),
            self.port
        )
    }
}

fn quote_server_option(value: &str) -> String {
    if value.contains(char::is_whitespace) {
        format!("'{}'", value.replace('\'', "\\'"))
    } else {
        value.to_string()
    }
}

// ============================================================================
// pg_ctl
// ============================================================================

/// Options for `pg_ctl initdb`.
#[derive(Debug, Clone)]
pub struct InitDbOptions {
    pub data_dir: PathBuf,
    /// Wait for the operation to complete.
    pub wait: bool,
}

impl InitDbOptions {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            wait: true,
        }
    }
}

impl ToArgs for InitDbOptions {
    fn to_args(&self) -> Vec<String> {
        let mut args = vec!["initdb".to_string()];
        add_flag(&mut args, "-w", self.wait);
        add_path(&mut args, "-D", &self.data_dir);
        args
    }
}

/// Options for `pg_ctl start`.
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub data_dir: PathBuf,
    pub wait: bool,
    pub bind: BindOptions,
}

impl StartOptions {
    pub fn new(data_dir: &Path, bind: &BindOptions) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            wait: true,
            bind: bind.clone(),
        }
    }
}

impl ToArgs for StartOptions {
    fn to_args(&self) -> Vec<String> {
        let mut args = vec!["start".to_string()];
        add_flag(&mut args, "-w", self.wait);
        add_path(&mut args, "-D", &self.data_dir);
        add_required(&mut args, "-o", self.bind.server_options());
        args
    }
}

/// Shutdown mode for `pg_ctl stop -m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    Smart,
    Fast,
    Immediate,
}

impl ShutdownMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownMode::Smart => "smart",
            ShutdownMode::Fast => "fast",
            ShutdownMode::Immediate => "immediate",
        }
    }
}

/// Options for `pg_ctl stop`.
#[derive(Debug, Clone)]
pub struct StopOptions {
    pub data_dir: PathBuf,
    pub wait: bool,
    /// Leave unset to use the server default.
    pub mode: Option<ShutdownMode>,
}

impl StopOptions {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            wait: true,
            mode: None,
        }
    }
}

impl ToArgs for StopOptions {
    fn to_args(&self) -> Vec<String> {
        let mut args = vec!["stop".to_string()];
        add_flag(&mut args, "-w", self.wait);
        add_path(&mut args, "-D", &self.data_dir);
        add_option(&mut args, "-m", &self.mode.map(|mode| mode.as_str()));
        args
    }
}

/// Options for `pg_ctl status`.
#[derive(Debug, Clone)]
pub struct StatusOptions {
    pub data_dir: PathBuf,
}

impl ToArgs for StatusOptions {
    fn to_args(&self) -> Vec<String> {
        let mut args = vec!["status".to_string()];
        add_path(&mut args, "-D", &self.data_dir);
        args
    }
}

// ============================================================================
// createdb
// ============================================================================

/// Options for `createdb`.
#[derive(Debug, Clone)]
pub struct CreateDbOptions {
    /// Role used to connect; also the default database name.
    pub owner: String,
    pub host: String,
    pub port: u16,
    /// Defaults to the owner's name.
    pub dbname: Option<String>,
}

impl CreateDbOptions {
    pub fn new(owner: &str, bind: &BindOptions) -> Self {
        Self {
            owner: owner.to_string(),
            host: bind.host.clone(),
            port: bind.port,
            dbname: None,
        }
    }
}

impl ToArgs for CreateDbOptions {
    fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        add_required(&mut args, "-U", &self.owner);
        add_required(&mut args, "-h", &self.host);
        add_required(&mut args, "-p", self.port.to_string());
        args.push(self.dbname.clone().unwrap_or_else(|| self.owner.clone()));
        args
    }
}

// ============================================================================
// psql
// ============================================================================

/// Options for running one script file through `psql`.
#[derive(Debug, Clone)]
pub struct PsqlOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub dbname: String,
    pub file: PathBuf,
}

impl ToArgs for PsqlOptions {
    fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        // Ignore ~/.psqlrc so results do not depend on who runs the suite.
        add_flag(&mut args, "-X", true);
        add_flag(&mut args, "-q", true);
        // Tuples only, unaligned, never paged: raw TAP lines on stdout.
        add_flag(&mut args, "-t", true);
        add_required(&mut args, "-P", "format=unaligned");
        add_required(&mut args, "-P", "pager=off");
        add_required(&mut args, "-v", "QUIET=1");
        add_required(&mut args, "-v", "ON_ERROR_STOP=1");
        add_required(&mut args, "-v", "ON_ERROR_ROLLBACK=1");
        add_required(&mut args, "-h", &self.host);
        add_required(&mut args, "-p", self.port.to_string());
        add_required(&mut args, "-U", &self.user);
        add_required(&mut args, "-d", &self.dbname);
        add_path(&mut args, "-f", &self.file);
        args
    }
}
