//! Strongly-typed wrappers around the PostgreSQL command-line programs.
//!
//! The harness never builds shell strings: each program gets an options
//! struct that renders its argument list, and [`InstanceController`] is the
//! seam between orchestration logic and the real `pg_ctl`/`createdb`.

mod commands;
mod controller;
mod options;

pub use commands::CommandLine;
pub(crate) use commands::exit_code;
pub use controller::{CommandExit, InstanceController, PgCtl, PG_CTL_NOT_RUNNING};
pub use options::{
    BindOptions, CreateDbOptions, InitDbOptions, PsqlOptions, ShutdownMode, StartOptions,
    StatusOptions, StopOptions,
};
