use colored::*;
use pgtap_harness::{AggregateSummary, TapSummary};
use std::path::Path;

/// Color mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    pub fn should_colorize(&self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => {
                // Check if stdout is a TTY and colors are supported
                atty::is(atty::Stream::Stdout)
                    && supports_color::on(supports_color::Stream::Stdout).is_some()
            }
        }
    }
}

fn pass_fail(success: bool, colorize: bool) -> String {
    match (success, colorize) {
        (true, true) => "PASS".green().bold().to_string(),
        (false, true) => "FAIL".red().bold().to_string(),
        (true, false) => "PASS".to_string(),
        (false, false) => "FAIL".to_string(),
    }
}

/// Header printed before a project's TAP output
pub fn format_project_header(project: &Path, colorize: bool) -> String {
    let title = format!("{} project test summary:", project.display());
    if colorize {
        title.bold().to_string()
    } else {
        title
    }
}

/// One line per failed test of a script, e.g. `  not ok 2 - column has type`
pub fn format_failures(summary: &TapSummary, colorize: bool) -> Vec<String> {
    let mut lines: Vec<String> = summary
        .failed()
        .into_iter()
        .map(|test| {
            let line = format!("  not ok {} - {}", test.number, test.description);
            if colorize {
                line.red().to_string()
            } else {
                line
            }
        })
        .collect();

    if summary.missing() > 0 {
        lines.push(format!(
            "  planned {} test(s) but only {} ran",
            summary.plan.unwrap_or_default(),
            summary.tests.len()
        ));
    }
    if summary.bailed_out {
        lines.push("  bailed out".to_string());
    }
    lines
}

/// Final line for a project, e.g. `PASS my_project: 3 script(s), 5 passed, 0 failed`
pub fn format_project_result(project: &Path, aggregate: &AggregateSummary, colorize: bool) -> String {
    let name = if colorize {
        project.display().to_string().bright_black().to_string()
    } else {
        project.display().to_string()
    };
    format!(
        "{} {}: {}",
        pass_fail(aggregate.is_success(), colorize),
        name,
        aggregate
    )
}

pub fn format_status(data_dir: &Path, running: bool, colorize: bool) -> String {
    let state = match (running, colorize) {
        (true, true) => "running".green().to_string(),
        (false, true) => "not running".yellow().to_string(),
        (true, false) => "running".to_string(),
        (false, false) => "not running".to_string(),
    };
    format!("postgres harness at {} is {}", data_dir.display(), state)
}
