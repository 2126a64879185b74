//! Test-generation adapter

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::oracle::{decode, Oracle, OracleError, OracleRequest};

use super::detect::detect_framework;
use super::TestSetup;

const MAX_SOURCE_LINES: usize = 500;

/// A generated test file, not yet necessarily written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedTest {
    pub test_code: String,
    pub test_file_name: String,
    pub framework: String,
    #[serde(default)]
    pub run_command: String,
    pub source_file: String,
    /// Where the test was saved, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

/// Payload shape the oracle returns for a generation request.
#[derive(Debug, Deserialize)]
struct GenerationPayload {
    #[serde(default)]
    test_code: String,
    #[serde(default)]
    test_file_name: String,
}

/// Requests unit-test code from the oracle for a changed source file.
pub struct TestGenerator {
    oracle: Arc<dyn Oracle>,
    base_dir: PathBuf,
}

impl TestGenerator {
    pub fn new(oracle: Arc<dyn Oracle>, base_dir: impl AsRef<Path>) -> Self {
        Self { oracle, base_dir: base_dir.as_ref().to_path_buf() }
    }

    /// Generate tests for one source file, with the captured diff as
    /// context when available.
    pub async fn generate(
        &self,
        source_file: &Path,
        description: &str,
        setup: Option<&TestSetup>,
        diff_context: Option<&str>,
    ) -> Result<GeneratedTest, OracleError> {
        if !source_file.exists() {
            return Err(OracleError::exec(format!(
                "source file not found: {}",
                source_file.display()
            )));
        }

        let framework = setup
            .map(|s| s.framework.clone())
            .unwrap_or_else(|| detect_framework(&self.base_dir));
        let run_command = setup
            .and_then(|s| s.commands.first())
            .map(|c| c.command.clone())
            .unwrap_or_default();

        let default_name = default_test_file_name(source_file, &framework);
        let source_code = read_truncated(source_file);

        let prompt = generation_prompt(
            &framework,
            source_file,
            &source_code,
            description,
            diff_context,
            &default_name,
        );

        debug!(file = %source_file.display(), framework = %framework, "requesting test generation");
        let response = self
            .oracle
            .complete(&OracleRequest::new(prompt).in_dir(&self.base_dir))
            .await?;

        let payload: GenerationPayload = decode::decode_json(&response)?;
        if payload.test_code.trim().is_empty() {
            return Err(OracleError::decode("empty test_code in response", &response));
        }

        Ok(GeneratedTest {
            test_code: payload.test_code,
            test_file_name: if payload.test_file_name.is_empty() {
                default_name
            } else {
                payload.test_file_name
            },
            framework,
            run_command,
            source_file: source_file.to_string_lossy().into_owned(),
            output_file: None,
        })
    }

    /// Generate and write the test file under the base directory.
    pub async fn generate_and_save(
        &self,
        source_file: &Path,
        description: &str,
        setup: Option<&TestSetup>,
        diff_context: Option<&str>,
    ) -> Result<GeneratedTest, OracleError> {
        let mut test = self.generate(source_file, description, setup, diff_context).await?;

        let target = {
            let name = Path::new(&test.test_file_name);
            if name.is_absolute() { name.to_path_buf() } else { self.base_dir.join(name) }
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| OracleError::exec(format!("cannot create test dir: {e}")))?;
        }
        fs::write(&target, &test.test_code)
            .map_err(|e| OracleError::exec(format!("cannot write test file: {e}")))?;

        info!(file = %target.display(), "saved generated test file");
        test.output_file = Some(target.to_string_lossy().into_owned());
        Ok(test)
    }
}

/// Framework-conventional test file name for a source file.
fn default_test_file_name(source_file: &Path, framework: &str) -> String {
    let base = source_file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let stem = source_file.file_stem().map(|n| n.to_string_lossy()).unwrap_or_default();
    let ext = source_file
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    match framework {
        "pytest" | "unittest" => format!("test_{base}"),
        "jest" | "vitest" | "mocha" => format!("{stem}.test{ext}"),
        "junit" => format!("{stem}Test.java"),
        "go" => format!("{stem}_test.go"),
        "cargo" => format!("{stem}_test.rs"),
        _ => format!("test_{base}"),
    }
}

fn read_truncated(path: &Path) -> String {
    let content = fs::read_to_string(path).unwrap_or_else(|e| format!("# error reading file: {e}"));
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() > MAX_SOURCE_LINES {
        format!(
            "{}\n# ... (file truncated at {MAX_SOURCE_LINES} lines)",
            lines[..MAX_SOURCE_LINES].join("\n")
        )
    } else {
        content
    }
}

fn generation_prompt(
    framework: &str,
    source_file: &Path,
    source_code: &str,
    description: &str,
    diff_context: Option<&str>,
    default_name: &str,
) -> String {
    let diff_section = diff_context
        .map(|diff| {
            format!(
                "\nCHANGES MADE (diff):\n```diff\n{diff}\n```\nGenerate tests specifically for the changes shown above.\n"
            )
        })
        .unwrap_or_default();

    let file_name = source_file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();

    format!(
        r#"You are an expert test engineer. Generate comprehensive unit tests for the code changes.

TEST FRAMEWORK: {framework}

SOURCE FILE: {file_name}
```
{source_code}
```
{diff_section}
TEST REQUIREMENTS:
{description}

TASK:
Generate complete, runnable unit tests that follow {framework} conventions, cover edge cases and error handling, and focus on new or modified functionality.

Return your response as a JSON object with this structure:
{{
  "test_code": "complete test file content here",
  "test_file_name": "{default_name}"
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

    fn generation_response(code: &str, name: &str) -> String {
        serde_json::json!({ "test_code": code, "test_file_name": name }).to_string()
    }

    #[test]
    fn default_names_follow_framework_conventions() {
        let src = Path::new("src/app.py");
        assert_eq!(default_test_file_name(src, "pytest"), "test_app.py");

        let src = Path::new("component.tsx");
        assert_eq!(default_test_file_name(src, "jest"), "component.test.tsx");

        let src = Path::new("Service.java");
        assert_eq!(default_test_file_name(src, "junit"), "ServiceTest.java");

        let src = Path::new("handler.go");
        assert_eq!(default_test_file_name(src, "go"), "handler_test.go");

        let src = Path::new("lib.rs");
        assert_eq!(default_test_file_name(src, "cargo"), "lib_test.rs");
    }

    #[tokio::test]
    async fn generated_test_is_saved_under_base_dir() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("app.py");
        fs::write(&src, "def add(a, b):\n    return a + b\n").unwrap();

        let oracle = MockOracle::new();
        oracle.push_text(generation_response(
            "def test_add():\n    assert add(1, 2) == 3\n",
            "test_app.py",
        ));

        let generator = TestGenerator::new(Arc::new(oracle), dir.path());
        let test = generator.generate_and_save(&src, "test the add function", None, None).await.unwrap();

        assert_eq!(test.test_file_name, "test_app.py");
        let saved = test.output_file.unwrap();
        assert!(fs::read_to_string(&saved).unwrap().contains("test_add"));
    }

    #[tokio::test]
    async fn missing_source_file_fails_before_calling_oracle() {
        let dir = TempDir::new().unwrap();
        let oracle = MockOracle::new();
        let generator = TestGenerator::new(Arc::new(oracle.clone()), dir.path());

        let err = generator
            .generate(Path::new("/nonexistent/file.py"), "desc", None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("source file not found"));
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn diff_context_is_embedded_in_the_prompt() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("app.py");
        fs::write(&src, "x = 1\n").unwrap();

        let oracle = MockOracle::new();
        oracle.push_text(generation_response("def test_x(): pass\n", ""));

        let generator = TestGenerator::new(Arc::new(oracle.clone()), dir.path());
        let test = generator
            .generate(&src, "desc", None, Some("diff --git a/app.py b/app.py"))
            .await
            .unwrap();

        // Empty name in the payload falls back to the framework default.
        assert_eq!(test.test_file_name, "test_app.py");
        assert!(oracle.prompts()[0].contains("CHANGES MADE"));
        assert!(oracle.prompts()[0].contains("diff --git a/app.py"));
    }

    #[tokio::test]
    async fn empty_test_code_is_a_decode_failure() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("app.py");
        fs::write(&src, "x = 1\n").unwrap();

        let oracle = MockOracle::new();
        oracle.push_text(generation_response("", "test_app.py"));

        let generator = TestGenerator::new(Arc::new(oracle), dir.path());
        let err = generator.generate(&src, "desc", None, None).await.unwrap_err();
        assert!(matches!(err, crate::oracle::OracleError::Decode { .. }));
    }
}
