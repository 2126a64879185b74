//! Framework-recommendation adapter
//!
//! Detection of test files and configs is deterministic; only the
//! recommendation text comes from the oracle.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info};

use crate::oracle::{decode, Oracle, OracleError, OracleRequest};

use super::detect::{find_config_files, find_test_files};
use super::TestSetup;

const MAX_CONTEXT_TEST_FILES: usize = 10;
const CONFIG_SAMPLE_LINES: usize = 30;
const TEST_SAMPLE_LINES: usize = 20;
const MANIFEST_SAMPLE_LINES: usize = 15;

/// Ask the oracle for a recommended test setup for `dir`.
///
/// Fails softly (error result, no panic) when the directory contains
/// neither test files nor recognized config files.
pub async fn recommend_test_setup(
    oracle: &dyn Oracle,
    dir: impl AsRef<Path>,
) -> Result<TestSetup, OracleError> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Err(OracleError::exec(format!("directory not found: {}", dir.display())));
    }

    let test_files = find_test_files(dir);
    let config_files = find_config_files(dir);

    if test_files.is_empty() && config_files.is_empty() {
        return Err(OracleError::exec("no test files or test configuration found"));
    }

    debug!(
        tests = test_files.len(),
        configs = config_files.len(),
        "building recommendation context"
    );

    let context = build_context(dir, &test_files, &config_files);
    let prompt = recommendation_prompt(&context);

    let response = oracle.complete(&OracleRequest::new(prompt).in_dir(dir)).await?;
    let mut setup: TestSetup = decode::decode_json(&response)?;

    setup.test_files_found = test_files.len();
    setup.config_files_found = config_files.iter().map(|(name, _)| name.clone()).collect();

    info!(framework = %setup.framework, commands = setup.commands.len(), "test setup recommended");
    Ok(setup)
}

fn read_sample(path: &Path, max_lines: usize) -> String {
    let Ok(file) = fs::File::open(path) else {
        return format!("# error reading {}", path.display());
    };
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .take(max_lines)
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_context(dir: &Path, test_files: &[std::path::PathBuf], config_files: &[(String, std::path::PathBuf)]) -> String {
    let mut parts = Vec::new();

    if !config_files.is_empty() {
        parts.push("=== Configuration Files ===".to_string());
        for (name, path) in config_files {
            parts.push(format!("\nConfig: {name}"));
            parts.push(read_sample(path, CONFIG_SAMPLE_LINES));
        }
    }

    if !test_files.is_empty() {
        parts.push("\n=== Test Files ===".to_string());
        for path in test_files.iter().take(MAX_CONTEXT_TEST_FILES) {
            let rel = path.strip_prefix(dir).unwrap_or(path);
            parts.push(format!("\nTest File: {}", rel.display()));
            parts.push(read_sample(path, TEST_SAMPLE_LINES));
        }
    }

    parts.push("\n=== Project Files ===".to_string());
    for manifest in ["package.json", "requirements.txt", "Gemfile", "go.mod", "Cargo.toml"] {
        let path = dir.join(manifest);
        if path.exists() {
            parts.push(format!("\nFound: {manifest}"));
            parts.push(read_sample(&path, MANIFEST_SAMPLE_LINES));
        }
    }

    parts.join("\n")
}

fn recommendation_prompt(context: &str) -> String {
    format!(
        r#"You are a test automation expert. Analyze the following project and generate commands to run unit tests.

PROJECT CONTEXT:
{context}

TASK:
Generate appropriate commands to run unit tests for this project. Consider the testing framework in use, configuration files present, and package managers.

Return a JSON object with this EXACT structure:
{{
  "framework": "name of the testing framework detected",
  "commands": [
    {{ "command": "full command to run tests", "description": "what this command does", "scope": "all|unit|integration|specific" }}
  ],
  "setup_commands": [
    {{ "command": "setup command if needed", "description": "what this setup does" }}
  ],
  "environment_variables": [
    {{ "name": "ENV_VAR_NAME", "value": "suggested value", "description": "what this variable controls" }}
  ],
  "notes": "Additional notes or recommendations"
}}

Return ONLY valid JSON, no additional text.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::mock::MockOracle;
    use tempfile::TempDir;

    #[tokio::test]
    async fn empty_directory_fails_softly_without_calling_oracle() {
        let dir = TempDir::new().unwrap();
        let oracle = MockOracle::new();

        let err = recommend_test_setup(&oracle, dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("no test files"));
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn recommendation_is_decoded_and_enriched_with_detection() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pytest.ini"), "[pytest]\n").unwrap();
        fs::write(dir.path().join("test_app.py"), "def test_x(): pass\n").unwrap();

        let oracle = MockOracle::new();
        oracle.push_text(
            r#"```json
{
  "framework": "pytest",
  "commands": [{"command": "pytest -v", "description": "run all tests", "scope": "all"}],
  "setup_commands": [],
  "environment_variables": [],
  "notes": ""
}
```"#,
        );

        let setup = recommend_test_setup(&oracle, dir.path()).await.unwrap();
        assert_eq!(setup.framework, "pytest");
        assert_eq!(setup.commands[0].command, "pytest -v");
        assert_eq!(setup.test_files_found, 1);
        assert_eq!(setup.config_files_found, vec!["pytest.ini".to_string()]);
    }

    #[tokio::test]
    async fn undecodable_response_surfaces_as_decode_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pytest.ini"), "[pytest]\n").unwrap();

        let oracle = MockOracle::new();
        oracle.push_text("no json today");

        let err = recommend_test_setup(&oracle, dir.path()).await.unwrap_err();
        assert!(matches!(err, OracleError::Decode { .. }));
    }
}
