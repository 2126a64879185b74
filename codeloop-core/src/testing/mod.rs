//! Test-suite detection, recommendation, generation, and execution

use serde::{Deserialize, Serialize};

pub mod commands;
pub mod detect;
pub mod generate;
pub mod runner;

pub use commands::recommend_test_setup;
pub use detect::{detect_framework, find_config_files, find_test_files};
pub use generate::{GeneratedTest, TestGenerator};
pub use runner::{TestRunReport, TestRunner, TestSummary};

/// Recommended test setup for a project: framework identity plus the
/// commands to run it. Produced by the oracle, backed by deterministic
/// file detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSetup {
    #[serde(alias = "test_framework")]
    pub framework: String,
    #[serde(default)]
    pub commands: Vec<TestCommand>,
    #[serde(default)]
    pub setup_commands: Vec<SetupCommand>,
    #[serde(default)]
    pub environment_variables: Vec<EnvVar>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub test_files_found: usize,
    #[serde(default)]
    pub config_files_found: Vec<String>,
}

/// A single shell-invocable test command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCommand {
    pub command: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupCommand {
    pub command: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub description: String,
}
