//! Ephemeral PostgreSQL harness for running pgTAP test projects.
//!
//! The harness starts a throwaway PostgreSQL instance in its own data
//! directory, installs a few helper functions and the `pgtap` extension, then
//! runs every `test_*.sql` script of a project through `psql` and hands back
//! the raw TAP output.
//!
//! ## Configuration
//!
//! Everything is driven by [`HarnessConfig`]: data directory, bind address,
//! program paths and an optional per-command timeout. The owner role falls
//! back to `$USER` and the recorded virtual environment to `$VIRTUAL_ENV`.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use pgtap_harness::{with_harness, HarnessConfig, PostgresHarness, TapSummary, TestManager};
//!
//! #[tokio::main]
//! async fn main() -> pgtap_harness::HarnessResult<()> {
//!     let config = HarnessConfig::default();
//!     let harness = PostgresHarness::new(config.clone());
//!
//!     let outputs = with_harness(&harness, None, || async {
//!         let mut manager = TestManager::from_config(&config, None)?;
//!         manager.ensure_initialized().await?;
//!         manager.execute_project_test(Path::new("my_project"), None).await
//!     })
//!     .await?;
//!
//!     for output in &outputs {
//!         println!("{}", TapSummary::parse(output).is_success());
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fixtures;
pub mod jsonpath;
pub mod manager;
pub mod query;
pub mod script;
pub mod server;
pub mod tap;

pub use api::{BindOptions, InstanceController, PgCtl};
pub use bootstrap::BootstrapScripts;
pub use config::HarnessConfig;
pub use discovery::{discover_test_scripts, ProjectTestDir};
pub use error::{HarnessError, HarnessResult};
pub use fixtures::copy_json;
pub use jsonpath::{JsonPath, JsonPathExtractor};
pub use manager::{BootstrapState, TestManager};
pub use query::{HarnessStateStore, ProjectState, QueryHelper};
pub use script::{Psql, ScriptOutput, ScriptRunner};
pub use server::{with_harness, PostgresHarness};
pub use tap::{AggregateSummary, TapSummary};
