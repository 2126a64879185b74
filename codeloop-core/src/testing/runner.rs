//! Test execution and output parsing
//!
//! Runs suite commands through a shell and parses framework output into
//! structured summaries. A run only counts as a success when the exit
//! code is zero, no test failed, and at least one test actually ran.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_FAILURE_MESSAGE: usize = 200;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("test command timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to spawn test command: {0}")]
    Spawn(String),
    #[error("no test command available for framework '{0}'")]
    NoCommand(String),
}

/// Aggregate counts parsed from a test run's output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// A single test's result, where the output names it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub status: String,
}

/// Full report for one executed test command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunReport {
    pub success: bool,
    pub framework: String,
    pub command: String,
    pub exit_code: Option<i32>,
    pub summary: TestSummary,
    pub outcomes: Vec<TestOutcome>,
    pub failures: Vec<String>,
    pub stdout: String,
    pub stderr: String,
}

/// Executes test commands via `sh -c` in a working directory.
pub struct TestRunner {
    base_dir: PathBuf,
    timeout: Duration,
    env: HashMap<String, String>,
}

impl TestRunner {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            timeout: DEFAULT_TIMEOUT,
            env: HashMap::new(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Run an explicit command, parsing its output per `framework`.
    pub async fn run_command(&self, command: &str, framework: &str) -> Result<TestRunReport, RunError> {
        info!(command, framework, "running test command");

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.base_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (name, value) in &self.env {
            cmd.env(name, value);
        }

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| RunError::Timeout(self.timeout))?
            .map_err(|e| RunError::Spawn(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code();

        let combined = format!("{stdout}\n{stderr}");
        let (summary, outcomes, failures) = parse_output(framework, &combined);

        let success = exit_code == Some(0) && summary.failed == 0 && summary.total > 0;
        if !success {
            warn!(
                exit_code = ?exit_code,
                failed = summary.failed,
                total = summary.total,
                "test run did not succeed"
            );
        }

        Ok(TestRunReport {
            success,
            framework: framework.to_string(),
            command: command.to_string(),
            exit_code,
            summary,
            outcomes,
            failures,
            stdout,
            stderr,
        })
    }

    /// Run the conventional suite command for a framework.
    pub async fn run_framework(&self, framework: &str) -> Result<TestRunReport, RunError> {
        let command =
            default_command(framework).ok_or_else(|| RunError::NoCommand(framework.to_string()))?;
        self.run_command(command, framework).await
    }
}

/// Conventional suite-wide command per framework.
pub fn default_command(framework: &str) -> Option<&'static str> {
    match framework {
        "pytest" => Some("pytest -v --tb=short"),
        "unittest" => Some("python -m unittest discover -v"),
        "jest" => Some("npx jest --verbose"),
        "vitest" => Some("npx vitest run"),
        "mocha" => Some("npx mocha"),
        "junit" => Some("mvn test"),
        "go" => Some("go test -v ./..."),
        "cargo" => Some("cargo test"),
        _ => None,
    }
}

fn parse_output(framework: &str, output: &str) -> (TestSummary, Vec<TestOutcome>, Vec<String>) {
    match framework {
        "pytest" | "unittest" => parse_pytest_output(output),
        "jest" | "vitest" => parse_jest_output(output),
        "cargo" => parse_cargo_output(output),
        _ => {
            debug!(framework, "no structured parser, using generic counts");
            parse_pytest_output(output)
        }
    }
}

static PY_PASSED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+passed").unwrap());
static PY_FAILED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+failed").unwrap());
static PY_SKIPPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+skipped").unwrap());
static PY_DURATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"in\s+([\d.]+)s").unwrap());
static PY_TEST_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(\S+::\S+)\s+(PASSED|FAILED|SKIPPED)").unwrap());
static PY_COVERAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"TOTAL\s+\d+\s+\d+\s+(\d+)%").unwrap());

fn capture_usize(re: &Regex, text: &str) -> usize {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn parse_pytest_output(output: &str) -> (TestSummary, Vec<TestOutcome>, Vec<String>) {
    let passed = capture_usize(&PY_PASSED, output);
    let failed = capture_usize(&PY_FAILED, output);
    let skipped = capture_usize(&PY_SKIPPED, output);

    let summary = TestSummary {
        total: passed + failed + skipped,
        passed,
        failed,
        skipped,
        coverage: PY_COVERAGE
            .captures(output)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok()),
        duration_secs: PY_DURATION
            .captures(output)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok()),
    };

    let mut outcomes = Vec::new();
    let mut failures = Vec::new();
    for cap in PY_TEST_LINE.captures_iter(output) {
        let name = cap[1].to_string();
        let status = cap[2].to_lowercase();
        if status == "failed" {
            failures.push(truncate(&name, MAX_FAILURE_MESSAGE));
        }
        outcomes.push(TestOutcome { name, status });
    }

    (summary, outcomes, failures)
}

static JEST_PASSED: Lazy<Regex> = Lazy::new(|| Regex::new(r"Tests:.*?(\d+)\s+passed").unwrap());
static JEST_FAILED: Lazy<Regex> = Lazy::new(|| Regex::new(r"Tests:.*?(\d+)\s+failed").unwrap());
static JEST_SKIPPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"Tests:.*?(\d+)\s+skipped").unwrap());
static JEST_TOTAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"Tests:.*?(\d+)\s+total").unwrap());
static JEST_DURATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"Time:\s+([\d.]+)\s*s").unwrap());
static JEST_TEST_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(✓|✕)\s+(.+?)(?:\s+\(\d+\s*ms\))?$").unwrap());

fn parse_jest_output(output: &str) -> (TestSummary, Vec<TestOutcome>, Vec<String>) {
    let passed = capture_usize(&JEST_PASSED, output);
    let failed = capture_usize(&JEST_FAILED, output);
    let skipped = capture_usize(&JEST_SKIPPED, output);
    let total = capture_usize(&JEST_TOTAL, output);

    let summary = TestSummary {
        total: if total > 0 { total } else { passed + failed + skipped },
        passed,
        failed,
        skipped,
        coverage: None,
        duration_secs: JEST_DURATION
            .captures(output)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok()),
    };

    let mut outcomes = Vec::new();
    let mut failures = Vec::new();
    for cap in JEST_TEST_LINE.captures_iter(output) {
        let name = cap[2].trim().to_string();
        let status = if &cap[1] == "✓" { "passed" } else { "failed" };
        if status == "failed" {
            failures.push(truncate(&name, MAX_FAILURE_MESSAGE));
        }
        outcomes.push(TestOutcome { name, status: status.to_string() });
    }

    (summary, outcomes, failures)
}

static CARGO_RESULT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"test result: \w+\. (\d+) passed; (\d+) failed; (\d+) ignored").unwrap()
});
static CARGO_TEST_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^test (\S+) \.\.\. (ok|FAILED|ignored)$").unwrap());

fn parse_cargo_output(output: &str) -> (TestSummary, Vec<TestOutcome>, Vec<String>) {
    let mut summary = TestSummary::default();
    // Workspace runs print one result line per test binary.
    for cap in CARGO_RESULT.captures_iter(output) {
        summary.passed += cap[1].parse::<usize>().unwrap_or(0);
        summary.failed += cap[2].parse::<usize>().unwrap_or(0);
        summary.skipped += cap[3].parse::<usize>().unwrap_or(0);
    }
    summary.total = summary.passed + summary.failed + summary.skipped;

    let mut outcomes = Vec::new();
    let mut failures = Vec::new();
    for cap in CARGO_TEST_LINE.captures_iter(output) {
        let name = cap[1].to_string();
        let status = match &cap[2] {
            "ok" => "passed",
            "FAILED" => "failed",
            _ => "skipped",
        };
        if status == "failed" {
            failures.push(truncate(&name, MAX_FAILURE_MESSAGE));
        }
        outcomes.push(TestOutcome { name, status: status.to_string() });
    }

    (summary, outcomes, failures)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PYTEST_OK: &str = "\
============================= test session starts ==============================
test_app.py::test_add PASSED
test_app.py::test_sub PASSED
test_app.py::test_div SKIPPED
========================= 2 passed, 1 skipped in 0.12s =========================
";

    const PYTEST_FAIL: &str = "\
test_app.py::test_add PASSED
test_app.py::test_div FAILED
=================== 1 failed, 1 passed in 0.34s ===================
";

    const JEST_OK: &str = "\
PASS  src/app.test.js
  ✓ adds numbers (3 ms)
  ✓ subtracts numbers (1 ms)

Tests:       2 passed, 2 total
Time:        1.21 s
";

    const CARGO_MIXED: &str = "\
running 3 tests
test math::adds ... ok
test math::divides ... FAILED
test math::ignored_case ... ignored

test result: FAILED. 1 passed; 1 failed; 1 ignored; 0 measured; 0 filtered out
";

    #[test]
    fn pytest_summary_and_outcomes_are_parsed() {
        let (summary, outcomes, failures) = parse_pytest_output(PYTEST_OK);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.duration_secs, Some(0.12));
        assert_eq!(outcomes.len(), 3);
        assert!(failures.is_empty());
    }

    #[test]
    fn pytest_failures_are_collected() {
        let (summary, _, failures) = parse_pytest_output(PYTEST_FAIL);
        assert_eq!(summary.failed, 1);
        assert_eq!(failures, vec!["test_app.py::test_div".to_string()]);
    }

    #[test]
    fn pytest_coverage_line_is_extracted() {
        let output = "2 passed in 0.10s\nTOTAL    120    12    90%\n";
        let (summary, _, _) = parse_pytest_output(output);
        assert_eq!(summary.coverage, Some(90));
    }

    #[test]
    fn jest_summary_uses_the_totals_line() {
        let (summary, outcomes, failures) = parse_jest_output(JEST_OK);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.duration_secs, Some(1.21));
        assert_eq!(outcomes.len(), 2);
        assert!(failures.is_empty());
    }

    #[test]
    fn cargo_results_accumulate_across_binaries() {
        let two_binaries = format!("{CARGO_MIXED}\ntest result: ok. 4 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out\n");
        let (summary, _, failures) = parse_cargo_output(&two_binaries);
        assert_eq!(summary.passed, 5);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(failures, vec!["math::divides".to_string()]);
    }

    #[test]
    fn unknown_framework_has_no_default_command() {
        assert!(default_command("unknown").is_none());
        assert_eq!(default_command("pytest"), Some("pytest -v --tb=short"));
    }

    #[tokio::test]
    async fn clean_exit_with_zero_tests_is_not_a_success() {
        let dir = TempDir::new().unwrap();
        let runner = TestRunner::new(dir.path());

        let report = runner.run_command("true", "pytest").await.unwrap();
        assert_eq!(report.exit_code, Some(0));
        assert_eq!(report.summary.total, 0);
        assert!(!report.success);
    }

    #[tokio::test]
    async fn failing_command_produces_a_failed_report() {
        let dir = TempDir::new().unwrap();
        let runner = TestRunner::new(dir.path());

        let report = runner
            .run_command("echo '1 failed, 1 passed in 0.02s'; exit 1", "pytest")
            .await
            .unwrap();
        assert_eq!(report.exit_code, Some(1));
        assert_eq!(report.summary.failed, 1);
        assert!(!report.success);
    }

    #[tokio::test]
    async fn passing_command_with_parsed_tests_succeeds() {
        let dir = TempDir::new().unwrap();
        let runner = TestRunner::new(dir.path());

        let report = runner
            .run_command("echo '3 passed in 0.05s'", "pytest")
            .await
            .unwrap();
        assert!(report.success);
        assert_eq!(report.summary.passed, 3);
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let dir = TempDir::new().unwrap();
        let runner = TestRunner::new(dir.path()).timeout(Duration::from_millis(100));

        let err = runner.run_command("sleep 5", "pytest").await.unwrap_err();
        assert!(matches!(err, RunError::Timeout(_)));
    }

    #[tokio::test]
    async fn env_vars_reach_the_command() {
        let dir = TempDir::new().unwrap();
        let runner = TestRunner::new(dir.path()).env("SUITE_MARK", "77");

        let report = runner
            .run_command("echo \"$SUITE_MARK passed in 0.01s\"", "pytest")
            .await
            .unwrap();
        assert_eq!(report.summary.passed, 77);
        assert!(report.success);
    }
}
