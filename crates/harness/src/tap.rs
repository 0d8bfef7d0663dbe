//! Summarizing the TAP output of a test script.
//!
//! Only the top-level stream is interpreted: indented subtest lines are
//! ignored, as are diagnostics (`# ...`) and anything unrecognized.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapTest {
    pub number: usize,
    pub description: String,
    pub ok: bool,
    /// Set for `# TODO` and `# SKIP` directives.
    pub directive: Option<TapDirective>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapDirective {
    Todo,
    Skip,
}

impl TapTest {
    /// A `not ok` under a TODO directive is an expected failure.
    pub fn is_failure(&self) -> bool {
        !self.ok && self.directive != Some(TapDirective::Todo)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TapSummary {
    pub tests: Vec<TapTest>,
    /// Number of tests announced by the `1..N` plan line.
    pub plan: Option<usize>,
    pub bailed_out: bool,
}

impl TapSummary {
    pub fn parse(output: &str) -> Self {
        let mut summary = Self::default();
        for line in output.lines() {
            // Subtests and continuation lines are indented.
            if line.starts_with(char::is_whitespace) {
                continue;
            }
            let line = line.trim_end();
            if line.starts_with("Bail out!") {
                summary.bailed_out = true;
            } else if let Some(plan) = parse_plan(line) {
                summary.plan = Some(plan);
            } else if let Some(test) = parse_test_line(line, summary.tests.len() + 1) {
                summary.tests.push(test);
            }
        }
        summary
    }

    pub fn passed(&self) -> Vec<&TapTest> {
        self.tests.iter().filter(|t| !t.is_failure()).collect()
    }

    pub fn failed(&self) -> Vec<&TapTest> {
        self.tests.iter().filter(|t| t.is_failure()).collect()
    }

    /// Tests announced by the plan that never reported.
    pub fn missing(&self) -> usize {
        self.plan
            .map(|plan| plan.saturating_sub(self.tests.len()))
            .unwrap_or(0)
    }

    pub fn is_success(&self) -> bool {
        !self.bailed_out && self.missing() == 0 && self.failed().is_empty()
    }

    /// Merge the summaries of several scripts, e.g. all scripts of a project.
    pub fn merge<'a>(summaries: impl IntoIterator<Item = &'a TapSummary>) -> AggregateSummary {
        let mut aggregate = AggregateSummary::default();
        for summary in summaries {
            aggregate.scripts += 1;
            aggregate.passed += summary.passed().len();
            aggregate.failed += summary.failed().len();
            aggregate.missing += summary.missing();
            aggregate.bailed_out |= summary.bailed_out;
        }
        aggregate
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateSummary {
    pub scripts: usize,
    pub passed: usize,
    pub failed: usize,
    pub missing: usize,
    pub bailed_out: bool,
}

impl AggregateSummary {
    pub fn is_success(&self) -> bool {
        !self.bailed_out && self.failed == 0 && self.missing == 0
    }
}

impl fmt::Display for AggregateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} script(s), {} passed, {} failed",
            self.scripts, self.passed, self.failed
        )?;
        if self.missing > 0 {
            write!(f, ", {} missing", self.missing)?;
        }
        if self.bailed_out {
            write!(f, ", bailed out")?;
        }
        Ok(())
    }
}

fn parse_plan(line: &str) -> Option<usize> {
    let rest = line.strip_prefix("1..")?;
    let digits: &str = rest
        .split(|c: char| c.is_whitespace() || c == '#')
        .next()
        .unwrap_or_default();
    digits.parse().ok()
}

fn parse_test_line(line: &str, next_number: usize) -> Option<TapTest> {
    let (ok, rest) = if let Some(rest) = line.strip_prefix("not ok") {
        (false, rest)
    } else if let Some(rest) = line.strip_prefix("ok") {
        (true, rest)
    } else {
        return None;
    };
    // "okay" and friends are not test lines.
    if !(rest.is_empty() || rest.starts_with(char::is_whitespace)) {
        return None;
    }
    let rest = rest.trim_start();

    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let number = rest[..digits_end].parse().unwrap_or(next_number);
    let rest = rest[digits_end..].trim_start();

    let (description, directive) = match directive_start(rest) {
        Some(hash) => (&rest[..hash], parse_directive(&rest[hash + 1..])),
        None => (rest, None),
    };
    let description = description
        .trim()
        .trim_start_matches('-')
        .trim()
        .replace("\\#", "#");

    Some(TapTest {
        number,
        description,
        ok,
        directive,
    })
}

/// Byte offset of the first `#` not escaped as `\#`.
fn directive_start(rest: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        match c {
            '\\' => escaped = !escaped,
            '#' if !escaped => return Some(i),
            _ => escaped = false,
        }
    }
    None
}

fn parse_directive(comment: &str) -> Option<TapDirective> {
    let word = comment.trim_start().get(..4)?.to_ascii_uppercase();
    match word.as_str() {
        "TODO" => Some(TapDirective::Todo),
        "SKIP" => Some(TapDirective::Skip),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_counts_passes_and_failures() {
        let summary = TapSummary::parse(
            "1..3\nok 1 - table exists\nnot ok 2 - column has type\n# Failed test 2\nok 3\n",
        );

        assert_eq!(summary.plan, Some(3));
        assert_eq!(summary.passed().len(), 2);
        let failed = summary.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].number, 2);
        assert_eq!(failed[0].description, "column has type");
        assert!(!summary.is_success());
    }

    #[test]
    fn test_todo_failure_is_not_a_failure() {
        let summary = TapSummary::parse("1..2\nok 1 - a\nnot ok 2 - b # TODO not yet\n");

        assert_eq!(summary.tests[1].directive, Some(TapDirective::Todo));
        assert!(summary.failed().is_empty());
        assert!(summary.is_success());
    }

    #[test]
    fn test_skip_directive_is_recorded() {
        let summary = TapSummary::parse("1..1\nok 1 - a # skip no plpython\n");
        assert_eq!(summary.tests[0].directive, Some(TapDirective::Skip));
        assert_eq!(summary.tests[0].description, "a");
    }

    #[test]
    fn test_escaped_hash_is_part_of_the_description() {
        let summary = TapSummary::parse(
            "1..2\nnot ok 1 - a \\# todo b\nok 2 - issue \\#12 # SKIP later\n",
        );

        let failed = summary.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].description, "a # todo b");
        assert_eq!(failed[0].directive, None);
        assert_eq!(summary.tests[1].description, "issue #12");
        assert_eq!(summary.tests[1].directive, Some(TapDirective::Skip));
        assert!(!summary.is_success());
    }

    #[test]
    fn test_short_plan_is_failure() {
        let summary = TapSummary::parse("1..3\nok 1\nok 2\n");
        assert_eq!(summary.missing(), 1);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_bail_out_is_failure() {
        let summary = TapSummary::parse("1..1\nBail out! database went away\n");
        assert!(summary.bailed_out);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_indented_subtests_and_noise_are_ignored() {
        let summary = TapSummary::parse(
            "1..1\n    not ok 1 - nested\n    1..1\nokay then\nNOTICE: hello\nok 1 - outer\n",
        );
        assert_eq!(summary.tests.len(), 1);
        assert_eq!(summary.plan, Some(1));
        assert!(summary.is_success());
    }

    #[test]
    fn test_missing_number_uses_position() {
        let summary = TapSummary::parse("ok - first\nnot ok - second\n");
        assert_eq!(summary.tests[0].number, 1);
        assert_eq!(summary.tests[1].number, 2);
        assert_eq!(summary.tests[1].description, "second");
    }

    #[test]
    fn test_merge_aggregates_scripts() {
        let a = TapSummary::parse("1..2\nok 1\nok 2\n");
        let b = TapSummary::parse("1..2\nok 1\nnot ok 2\n");

        let aggregate = TapSummary::merge([&a, &b]);

        assert_eq!(aggregate.scripts, 2);
        assert_eq!(aggregate.passed, 3);
        assert_eq!(aggregate.failed, 1);
        assert!(!aggregate.is_success());
        assert_eq!(aggregate.to_string(), "2 script(s), 3 passed, 1 failed");
    }
}
