//! Feature-implementation workflow: state machine and drivers
//!
//! A feature request moves through a fixed sequence of phases; when the
//! generated tests fail, the run loops back to code modification with
//! the failures as context, up to a retry limit.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::oracle::ChangeOutcome;
use crate::testing::{GeneratedTest, TestRunReport, TestSetup};

pub mod engine;

pub use engine::{run_batch, run_feature_workflow, WorkflowEngine};

/// Workflow phases. `End` is the only terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    GenerateTestCommands,
    ModifyCode,
    GenerateUnitTests,
    RunTests,
    End,
}

/// One feature to implement: what to build and where.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRequest {
    pub description: String,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default = "default_base_dir")]
    pub base_directory: PathBuf,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_retries() -> usize {
    3
}

impl FeatureRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            files: Vec::new(),
            base_directory: default_base_dir(),
            max_retries: default_max_retries(),
        }
    }

    pub fn file(mut self, file: impl Into<PathBuf>) -> Self {
        self.files.push(file.into());
        self
    }

    pub fn base_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.base_directory = dir.as_ref().to_path_buf();
        self
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Mutable record of one feature run. Owned exclusively by the engine
/// and mutated sequentially; `errors` and `logs` are append-only.
#[derive(Debug)]
pub struct WorkflowState {
    pub feature_description: String,
    pub feature_files: Vec<PathBuf>,
    pub base_directory: PathBuf,
    pub max_retries: usize,
    pub retry_count: usize,
    pub phase: Phase,

    pub test_setup: Option<TestSetup>,
    pub change_result: Option<ChangeOutcome>,
    pub changes_diff: Option<String>,
    pub modified_files: Vec<String>,
    pub generated_tests: Vec<GeneratedTest>,
    pub test_results: Option<TestRunReport>,

    pub success: bool,
    pub final_message: String,
    pub errors: Vec<String>,
    pub logs: Vec<String>,

    // Errors from phases whose failure rules out a retry.
    blocking_errors: usize,
}

impl WorkflowState {
    /// Initialize from a request, absolutizing relative feature files
    /// against the base directory.
    pub fn init(request: FeatureRequest) -> Self {
        let feature_files = request
            .files
            .into_iter()
            .map(|file| {
                if file.is_absolute() { file } else { request.base_directory.join(file) }
            })
            .collect();

        Self {
            feature_description: request.description,
            feature_files,
            base_directory: request.base_directory,
            max_retries: request.max_retries,
            retry_count: 0,
            phase: Phase::Start,
            test_setup: None,
            change_result: None,
            changes_diff: None,
            modified_files: Vec::new(),
            generated_tests: Vec::new(),
            test_results: None,
            success: false,
            final_message: String::new(),
            errors: Vec::new(),
            logs: Vec::new(),
            blocking_errors: 0,
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(message.into());
    }

    /// Record a phase error. Failures in code modification or test
    /// generation end the run; a failed recommendation or a failed test
    /// run does not by itself rule out a retry.
    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        if matches!(self.phase, Phase::ModifyCode | Phase::GenerateUnitTests) {
            self.blocking_errors += 1;
        }
        self.logs.push(format!("error: {message}"));
        self.errors.push(message);
    }

    pub(crate) fn has_blocking_errors(&self) -> bool {
        self.blocking_errors > 0
    }

    pub fn into_outcome(self) -> FeatureOutcome {
        let message = if self.final_message.is_empty() {
            "Workflow ended without a passing test run.".to_string()
        } else {
            self.final_message
        };
        FeatureOutcome {
            success: self.success,
            message,
            retry_count: self.retry_count,
            test_results: self.test_results,
            logs: self.logs,
            errors: self.errors,
            completed_at: Utc::now(),
        }
    }
}

/// Summary of one completed feature run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureOutcome {
    pub success: bool,
    pub message: String,
    pub retry_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_results: Option<TestRunReport>,
    pub logs: Vec<String>,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Aggregate result of a sequential batch of features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<FeatureOutcome>,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}
