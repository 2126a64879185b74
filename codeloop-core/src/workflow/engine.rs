//! Workflow engine: phase execution and retry decisions

use std::sync::Arc;

use tracing::{info, warn};

use crate::oracle::{CodeModifier, Oracle};
use crate::testing::{
    commands::recommend_test_setup, detect::detect_framework, runner::default_command,
    TestGenerator, TestRunner,
};
use crate::vcs::{self, Baseline};

use super::{BatchReport, FeatureOutcome, FeatureRequest, Phase, WorkflowState};

const MAX_RETRY_CONTEXT_FAILURES: usize = 3;

/// Drives one feature through the phase sequence, looping back to code
/// modification on test failure until retries are exhausted.
pub struct WorkflowEngine {
    oracle: Arc<dyn Oracle>,
}

impl WorkflowEngine {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    pub async fn run(&self, request: FeatureRequest) -> FeatureOutcome {
        let mut state = WorkflowState::init(request);
        info!(
            feature = %state.feature_description,
            files = state.feature_files.len(),
            "starting feature workflow"
        );

        let mut phase = Phase::Start;
        loop {
            state.phase = phase;
            phase = match phase {
                Phase::Start => Phase::GenerateTestCommands,
                Phase::GenerateTestCommands => {
                    self.generate_test_commands(&mut state).await;
                    Phase::ModifyCode
                }
                Phase::ModifyCode => {
                    self.modify_code(&mut state).await;
                    Phase::GenerateUnitTests
                }
                Phase::GenerateUnitTests => {
                    self.generate_unittest(&mut state).await;
                    Phase::RunTests
                }
                Phase::RunTests => {
                    self.run_tests(&mut state).await;
                    next_after_tests(&mut state)
                }
                Phase::End => break,
            };
        }

        info!(success = state.success, retries = state.retry_count, "feature workflow finished");
        state.into_outcome()
    }

    /// Phase 1: ask for a recommended test setup. Runs once per feature;
    /// failure falls back to auto-detection downstream.
    async fn generate_test_commands(&self, state: &mut WorkflowState) {
        state.log("Step 1: Generating test commands...");

        let recommended = recommend_test_setup(self.oracle.as_ref(), &state.base_directory).await;
        match recommended {
            Ok(setup) => {
                state.log(format!(
                    "Recommended framework '{}' with {} command(s)",
                    setup.framework,
                    setup.commands.len()
                ));
                state.test_setup = Some(setup);
            }
            Err(err) => {
                state.record_error(format!("Failed to generate test commands: {err}"));
                state.log("Continuing with framework auto-detection");
            }
        }
    }

    /// Phase 2: modify the feature files, then capture the resulting
    /// diff from the git baseline as the canonical change record.
    async fn modify_code(&self, state: &mut WorkflowState) {
        let instruction = self.build_instruction(state);
        if state.retry_count > 0 {
            state.log(format!(
                "Retry {}/{}: modifying code with error context...",
                state.retry_count, state.max_retries
            ));
        } else {
            state.log("Step 2: Modifying code...");
        }

        let baseline = match Baseline::ensure(&state.base_directory) {
            Ok(baseline) => Some(baseline),
            Err(err) => {
                warn!(error = %err, "baseline unavailable, continuing without change tracking");
                state.log(format!("Baseline unavailable ({err}), continuing without tracking"));
                None
            }
        };

        let modifier = CodeModifier::new(Arc::clone(&self.oracle), &state.base_directory);
        let outcome = modifier.modify(&instruction, &state.feature_files).await;

        if !outcome.success {
            let reason = outcome.error.clone().unwrap_or_else(|| "unknown error".to_string());
            state.change_result = Some(outcome);
            state.record_error(format!("Failed to modify code: {reason}"));
            return;
        }

        state.log(format!("Modified {} file(s)", outcome.files_modified));
        state.change_result = Some(outcome);

        if let Some(baseline) = baseline {
            match baseline.diff_from_head() {
                Ok(diff) if !vcs::is_empty_diff(&diff) => {
                    state.modified_files = files_in_diff(&diff);
                    state.log(format!(
                        "Captured diff ({} lines, {} file(s))",
                        diff.lines().count(),
                        state.modified_files.len()
                    ));
                    state.changes_diff = Some(diff);
                }
                Ok(_) => {
                    state.log("No changes detected against baseline");
                    state.changes_diff = None;
                }
                Err(err) => {
                    warn!(error = %err, "could not capture diff");
                    state.log(format!("Could not capture diff: {err}"));
                    state.changes_diff = None;
                }
            }
        }
    }

    /// Phase 3: generate tests per feature file. Individual failures
    /// are skipped; producing nothing at all is a phase error.
    async fn generate_unittest(&self, state: &mut WorkflowState) {
        state.log("Step 3: Generating unit tests...");

        let generator = TestGenerator::new(Arc::clone(&self.oracle), &state.base_directory);
        let description = format!(
            "Generate comprehensive unit tests for the feature: {}\n\
             - Test all edge cases\n\
             - Test error handling\n\
             - Test normal operation\n\
             - Focus on the specific changes made to this file",
            state.feature_description
        );

        let files = state.feature_files.clone();
        let setup = state.test_setup.clone();
        let diff = state.changes_diff.clone();
        let mut generated = Vec::new();
        for file in &files {
            let result = generator
                .generate_and_save(file, &description, setup.as_ref(), diff.as_deref())
                .await;
            match result {
                Ok(test) => {
                    state.log(format!(
                        "Generated tests for {} -> {}",
                        file.display(),
                        test.test_file_name
                    ));
                    generated.push(test);
                }
                Err(err) => {
                    state.log(format!("Could not generate tests for {}: {err}", file.display()));
                }
            }
        }

        if generated.is_empty() {
            state.record_error("Failed to generate any tests");
        } else {
            state.log(format!("Generated {} test file(s)", generated.len()));
            state.generated_tests = generated;
        }
    }

    /// Phase 4: run the suite and judge the result. Success requires a
    /// clean exit, zero failures, and at least one test executed.
    async fn run_tests(&self, state: &mut WorkflowState) {
        state.log("Step 4: Running unit tests...");

        let (command, framework) = match self.pick_test_command(state) {
            Some(pair) => pair,
            None => {
                state.record_error("No test command available");
                return;
            }
        };

        let runner = TestRunner::new(&state.base_directory);
        let run = runner.run_command(&command, &framework).await;
        match run {
            Ok(report) => {
                if report.success && state.has_blocking_errors() {
                    // A green suite cannot vouch for a change that was
                    // never made.
                    state.log("Tests passed, but earlier phases recorded errors");
                } else if report.success {
                    state.log(format!("All {} tests passed", report.summary.passed));
                    state.success = true;
                    state.final_message = format!(
                        "Feature implemented and tested successfully! {}/{} tests passed.",
                        report.summary.passed, report.summary.total
                    );
                } else {
                    state.log(format!(
                        "{} test(s) failed ({} ran)",
                        report.summary.failed, report.summary.total
                    ));
                    for failure in report.failures.iter().take(MAX_RETRY_CONTEXT_FAILURES) {
                        state.log(format!("  failed: {failure}"));
                    }
                }
                state.test_results = Some(report);
            }
            Err(err) => {
                state.record_error(format!("Error running tests: {err}"));
            }
        }
    }

    /// Retry instruction: the base description plus the first few
    /// recorded test failures from the previous run.
    fn build_instruction(&self, state: &WorkflowState) -> String {
        let mut instruction = state.feature_description.clone();

        if state.retry_count > 0 {
            if let Some(report) = &state.test_results {
                if !report.failures.is_empty() {
                    let context = report
                        .failures
                        .iter()
                        .take(MAX_RETRY_CONTEXT_FAILURES)
                        .map(|f| format!("- {f}"))
                        .collect::<Vec<_>>()
                        .join("\n");
                    instruction = format!(
                        "{instruction}\n\n\
                         IMPORTANT: Previous implementation failed with these test errors:\n\
                         {context}\n\n\
                         Please fix these issues in the new implementation."
                    );
                }
            }
        }

        instruction
    }

    fn pick_test_command(&self, state: &WorkflowState) -> Option<(String, String)> {
        if let Some(setup) = &state.test_setup {
            if let Some(cmd) = setup.commands.first() {
                return Some((cmd.command.clone(), setup.framework.clone()));
            }
        }

        if let Some(test) = state.generated_tests.first() {
            if !test.run_command.is_empty() {
                return Some((test.run_command.clone(), test.framework.clone()));
            }
        }

        let framework = detect_framework(&state.base_directory);
        default_command(&framework).map(|cmd| (cmd.to_string(), framework))
    }
}

/// Decide where to go after a test run. Pure with respect to anything
/// outside the state record.
fn next_after_tests(state: &mut WorkflowState) -> Phase {
    if state.success {
        return Phase::End;
    }
    if state.has_blocking_errors() {
        return Phase::End;
    }

    match &state.test_results {
        Some(report) if !report.success => {
            if state.retry_count < state.max_retries {
                state.retry_count += 1;
                Phase::ModifyCode
            } else {
                state.final_message = format!(
                    "Tests failed after {} attempts. Manual intervention required.",
                    state.max_retries
                );
                Phase::End
            }
        }
        _ => Phase::End,
    }
}

/// File paths named in `diff --git a/... b/...` headers.
fn files_in_diff(diff: &str) -> Vec<String> {
    diff.lines()
        .filter(|line| line.starts_with("diff --git"))
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            (parts.len() >= 4).then(|| parts[2].trim_start_matches("a/").to_string())
        })
        .collect()
}

/// Run one feature end to end.
pub async fn run_feature_workflow(
    oracle: Arc<dyn Oracle>,
    request: FeatureRequest,
) -> FeatureOutcome {
    WorkflowEngine::new(oracle).run(request).await
}

/// Run features strictly in order; one failure never aborts the rest.
pub async fn run_batch(oracle: Arc<dyn Oracle>, requests: Vec<FeatureRequest>) -> BatchReport {
    let engine = WorkflowEngine::new(oracle);
    let total = requests.len();
    let mut results = Vec::with_capacity(total);

    for (index, request) in requests.into_iter().enumerate() {
        info!(feature = index + 1, total, "running batch feature");
        results.push(engine.run(request).await);
    }

    let successful = results.iter().filter(|r| r.success).count();
    BatchReport { failed: total - successful, successful, total, results }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::mock::MockOracle;
    use std::fs;
    use tempfile::TempDir;

    fn recommendation(command: &str) -> String {
        serde_json::json!({
            "framework": "pytest",
            "commands": [{"command": command, "description": "run tests", "scope": "all"}],
            "setup_commands": [],
            "environment_variables": [],
            "notes": ""
        })
        .to_string()
    }

    fn rewrite(path: &str, content: &str) -> String {
        serde_json::json!({ "files": [{"path": path, "new_content": content}] }).to_string()
    }

    fn generation(code: &str, name: &str) -> String {
        serde_json::json!({ "test_code": code, "test_file_name": name }).to_string()
    }

    fn seed_project(dir: &TempDir) {
        fs::write(dir.path().join("pytest.ini"), "[pytest]\n").unwrap();
        fs::write(dir.path().join("app.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("test_seed.py"), "def test_seed(): pass\n").unwrap();
    }

    #[tokio::test]
    async fn passing_tests_finish_without_retries() {
        let dir = TempDir::new().unwrap();
        seed_project(&dir);

        let oracle = MockOracle::new();
        oracle.push_text(recommendation("echo '2 passed in 0.01s'"));
        oracle.push_text(rewrite("app.py", "x = 2\n"));
        oracle.push_text(generation("def test_x(): assert True\n", "test_app.py"));

        let request = FeatureRequest::new("bump x").base_dir(dir.path()).file("app.py");
        let outcome = run_feature_workflow(Arc::new(oracle), request).await;

        assert!(outcome.success, "errors: {:?}", outcome.errors);
        assert_eq!(outcome.retry_count, 0);
        assert!(outcome.message.contains("2/2 tests passed"));
        assert_eq!(fs::read_to_string(dir.path().join("app.py")).unwrap(), "x = 2\n");
    }

    #[tokio::test]
    async fn failing_tests_retry_until_the_limit() {
        let dir = TempDir::new().unwrap();
        seed_project(&dir);

        let oracle = MockOracle::new();
        oracle.push_text(recommendation("echo '1 failed, 1 passed in 0.02s'; exit 1"));
        // One modify + one generation per attempt; max_retries=2 allows
        // three attempts in total.
        for attempt in 0..3 {
            oracle.push_text(rewrite("app.py", &format!("x = {attempt}\n")));
            oracle.push_text(generation("def test_x(): assert False\n", "test_app.py"));
        }

        let request =
            FeatureRequest::new("bump x").base_dir(dir.path()).file("app.py").max_retries(2);
        let outcome = run_feature_workflow(Arc::new(oracle.clone()), request).await;

        assert!(!outcome.success);
        assert_eq!(outcome.retry_count, 2);
        assert!(outcome.message.contains("after 2 attempts"));
        assert_eq!(oracle.call_count(), 7);
    }

    #[tokio::test]
    async fn clean_exit_without_tests_is_not_success() {
        let dir = TempDir::new().unwrap();
        seed_project(&dir);

        let oracle = MockOracle::new();
        oracle.push_text(recommendation("true"));
        oracle.push_text(rewrite("app.py", "x = 2\n"));
        oracle.push_text(generation("def test_x(): pass\n", "test_app.py"));

        let request =
            FeatureRequest::new("bump x").base_dir(dir.path()).file("app.py").max_retries(0);
        let outcome = run_feature_workflow(Arc::new(oracle), request).await;

        assert!(!outcome.success);
        let report = outcome.test_results.unwrap();
        assert_eq!(report.exit_code, Some(0));
        assert_eq!(report.summary.total, 0);
    }

    #[tokio::test]
    async fn modification_failure_ends_without_retrying() {
        let dir = TempDir::new().unwrap();
        seed_project(&dir);

        let oracle = MockOracle::new();
        oracle.push_text(recommendation("echo '1 passed in 0.01s'"));
        oracle.push_error(crate::oracle::OracleError::exec("model unavailable"));

        let request =
            FeatureRequest::new("bump x").base_dir(dir.path()).file("app.py").max_retries(3);
        let outcome = run_feature_workflow(Arc::new(oracle), request).await;

        assert!(!outcome.success);
        assert_eq!(outcome.retry_count, 0);
        assert!(outcome.errors.iter().any(|e| e.contains("Failed to modify code")));
    }

    #[tokio::test]
    async fn batch_isolates_feature_failures() {
        let ok_dir = TempDir::new().unwrap();
        seed_project(&ok_dir);
        let empty_dir = TempDir::new().unwrap();

        let oracle = MockOracle::new();
        // The first feature has no files and an empty project, so it
        // consumes no oracle responses at all.
        oracle.push_text(recommendation("echo '1 passed in 0.01s'"));
        oracle.push_text(rewrite("app.py", "x = 2\n"));
        oracle.push_text(generation("def test_x(): pass\n", "test_app.py"));

        let requests = vec![
            FeatureRequest::new("doomed").base_dir(empty_dir.path()),
            FeatureRequest::new("bump x").base_dir(ok_dir.path()).file("app.py"),
        ];
        let report = run_batch(Arc::new(oracle), requests).await;

        assert_eq!(report.total, 2);
        assert_eq!(report.successful, 1);
        assert_eq!(report.failed, 1);
        assert!(!report.results[0].success);
        assert!(report.results[1].success);
    }

    #[test]
    fn diff_headers_yield_modified_files() {
        let diff = "diff --git a/src/app.py b/src/app.py\n--- a/src/app.py\n+++ b/src/app.py\n\
                    diff --git a/new.py b/new.py\n";
        assert_eq!(files_in_diff(diff), vec!["src/app.py".to_string(), "new.py".to_string()]);
    }
}
