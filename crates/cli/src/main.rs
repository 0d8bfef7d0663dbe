mod config;
mod formatter;
mod runner;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Overrides;
use formatter::{format_status, ColorMode};
use pgtap_harness::{with_harness, HarnessConfig, PostgresHarness, TestManager};
use runner::{check_reports, run_projects, RunOptions};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pgtap")]
#[command(about = "Run pgTAP test projects against an ephemeral PostgreSQL instance", long_about = None)]
#[command(version)]
struct Cli {
    /// Harness config file (TOML). Defaults to the per-user config file if present
    #[arg(long, global = true, env = "PGTAP_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory of the ephemeral instance
    #[arg(long, global = true, env = "PGTAP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Port the instance listens on
    #[arg(long, global = true, env = "PGTAP_PORT")]
    port: Option<u16>,

    /// Kill any harness subprocess running longer than this many seconds
    #[arg(long, global = true, env = "PGTAP_TIMEOUT")]
    timeout: Option<u64>,

    /// Color output
    #[arg(long, global = true, value_enum, default_value = "auto")]
    color: ColorMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize and start the harness, then create the default database
    Start {
        /// Role owning the default database (defaults to $USER)
        #[arg(long, env = "PGTAP_USER")]
        user: Option<String>,
    },

    /// Stop the harness and remove its data directory
    Stop,

    /// Report whether the harness is running
    Status,

    /// Bootstrap the harness and run the tests of one or more projects
    Run {
        /// Project directory; repeat for several projects. Defaults to the current directory
        #[arg(short = 'w', long = "project-dir")]
        project_dirs: Vec<PathBuf>,

        /// Only run this script, relative to the project's test directory
        #[arg(long)]
        test_file: Option<PathBuf>,

        /// Start a harness for this run and stop it afterwards
        #[arg(long)]
        ephemeral: bool,

        /// Role to connect as (defaults to $USER)
        #[arg(long, env = "PGTAP_USER")]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only TAP output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let colorize = cli.color.should_colorize();
    let file_config = config::load_config(cli.config.as_deref())?;
    let overrides = Overrides {
        data_dir: cli.data_dir,
        port: cli.port,
        user: None,
        timeout_secs: cli.timeout,
    };

    match cli.command {
        Commands::Start { user } => {
            let harness = PostgresHarness::new(overrides.apply(file_config));
            harness
                .start(user.as_deref())
                .await
                .context("Failed to start the harness")?;
            info!(data_dir = %harness.data_dir().display(), "harness started");
            Ok(())
        }
        Commands::Stop => {
            let harness = PostgresHarness::new(overrides.apply(file_config));
            harness.stop().await.context("Failed to stop the harness")
        }
        Commands::Status => {
            let harness = PostgresHarness::new(overrides.apply(file_config));
            let running = harness.is_running().await?;
            println!("{}", format_status(harness.data_dir(), running, colorize));
            Ok(())
        }
        Commands::Run {
            project_dirs,
            test_file,
            ephemeral,
            user,
        } => {
            let config = Overrides { user, ..overrides }.apply(file_config);
            let project_dirs = if project_dirs.is_empty() {
                vec![std::env::current_dir().context("Could not determine current directory")?]
            } else {
                project_dirs
            };
            let options = RunOptions {
                project_dirs,
                test_file,
                colorize,
            };

            if ephemeral {
                let harness = PostgresHarness::new(config.clone());
                with_harness(&harness, None, || run(&config, &options)).await?
            } else {
                run(&config, &options).await?
            }
        }
    }
}

/// The outer result carries harness errors, the inner one the test verdict.
async fn run(
    config: &HarnessConfig,
    options: &RunOptions,
) -> pgtap_harness::HarnessResult<Result<()>> {
    let mut manager = TestManager::from_config(config, None)?;
    let mut stdout = std::io::stdout();
    Ok(run_projects(&mut manager, options, &mut stdout)
        .await
        .and_then(|reports| check_reports(&reports)))
}
