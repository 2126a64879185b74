//! Change-generation adapter
//!
//! Two protocols behind one contract: a whole-file protocol where the
//! oracle returns complete replacement content per file, and a diff
//! protocol where it returns unified-diff text that runs through the
//! patch parser and applier. Oracle failure or an undecodable payload
//! always surfaces as a `success: false` outcome, never a panic or a
//! half-crashed state.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::patch::{self, FileStatus, PatchApplier};

use super::{decode, preview, Oracle, OracleError, OracleRequest};

pub const BACKUP_SUFFIX: &str = ".backup";
const MAX_CONTEXT_LINES_PER_FILE: usize = 1000;

/// Whole-file payload the oracle returns: complete replacement content
/// per file needing change.
#[derive(Debug, Deserialize)]
struct FileRewrites {
    #[serde(default)]
    files: Vec<FileRewrite>,
}

#[derive(Debug, Deserialize)]
struct FileRewrite {
    path: String,
    #[serde(default)]
    new_content: String,
}

/// Per-file status after a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Modified,
    Created,
    Unchanged,
    Deleted,
    Skipped,
    WouldModify,
    Error,
}

/// One file's result within a change request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub file: String,
    pub status: ChangeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of one change request. Oracle failures are folded in
/// here rather than propagated: `success: false`, zero files modified,
/// and the error (plus a bounded response preview when decoding failed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeOutcome {
    pub success: bool,
    pub files_modified: usize,
    pub changes: Vec<FileChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_preview: Option<String>,
}

impl ChangeOutcome {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            files_modified: 0,
            changes: Vec::new(),
            error: Some(error.into()),
            raw_preview: None,
        }
    }

    fn failure_with_preview(error: impl Into<String>, raw: &str) -> Self {
        Self { raw_preview: Some(preview(raw)), ..Self::failure(error) }
    }
}

/// Issues change requests to the oracle and applies the results.
pub struct CodeModifier {
    oracle: Arc<dyn Oracle>,
    base_dir: PathBuf,
    create_backup: bool,
    dry_run: bool,
}

impl CodeModifier {
    pub fn new(oracle: Arc<dyn Oracle>, base_dir: impl AsRef<Path>) -> Self {
        Self {
            oracle,
            base_dir: base_dir.as_ref().to_path_buf(),
            create_backup: true,
            dry_run: false,
        }
    }

    pub fn create_backup(mut self, create_backup: bool) -> Self {
        self.create_backup = create_backup;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Whole-file protocol: send the instruction plus full file contents,
    /// receive complete replacement content per file, write it out.
    pub async fn modify(&self, instruction: &str, files: &[PathBuf]) -> ChangeOutcome {
        if instruction.trim().is_empty() {
            return ChangeOutcome::failure("instruction cannot be empty");
        }
        if files.is_empty() {
            return ChangeOutcome::failure("no files specified");
        }

        let context = self.build_file_context(files);
        let prompt = whole_file_prompt(instruction, &context);

        let request = OracleRequest::new(prompt).in_dir(&self.base_dir);
        let response = match self.oracle.complete(&request).await {
            Ok(text) => text,
            Err(err) => return ChangeOutcome::failure(err.to_string()),
        };

        let rewrites: FileRewrites = match decode::decode_json(&response) {
            Ok(r) => r,
            Err(err) => return ChangeOutcome::failure_with_preview(err.to_string(), &response),
        };

        if rewrites.files.is_empty() {
            debug!("oracle reported no changes needed");
            return ChangeOutcome {
                success: true,
                files_modified: 0,
                changes: Vec::new(),
                error: None,
                raw_preview: None,
            };
        }

        self.apply_rewrites(rewrites.files)
    }

    /// Diff protocol: the oracle returns unified-diff text which is
    /// parsed and applied with full positional verification.
    pub async fn modify_via_diff(&self, instruction: &str, files: &[PathBuf]) -> ChangeOutcome {
        if instruction.trim().is_empty() {
            return ChangeOutcome::failure("instruction cannot be empty");
        }

        let context = self.build_file_context(files);
        let prompt = diff_prompt(instruction, &context);

        let request = OracleRequest::new(prompt).in_dir(&self.base_dir);
        let response = match self.oracle.complete(&request).await {
            Ok(text) => text,
            Err(err) => return ChangeOutcome::failure(err.to_string()),
        };

        let diff_text = decode::strip_code_fences(&response);
        let patch = match patch::parse(diff_text) {
            Ok(p) => p,
            Err(err) => {
                return ChangeOutcome::failure_with_preview(
                    format!("failed to parse diff: {err}"),
                    diff_text,
                );
            }
        };

        if patch.is_empty() {
            return ChangeOutcome::failure_with_preview("no file changes found in diff", diff_text);
        }

        let report = PatchApplier::new(&self.base_dir).dry_run(self.dry_run).apply(&patch);

        let mut changes: Vec<FileChange> = report
            .results
            .iter()
            .map(|r| FileChange {
                file: r.file.clone(),
                status: match r.status {
                    FileStatus::Created => ChangeStatus::Created,
                    FileStatus::Modified => ChangeStatus::Modified,
                    FileStatus::Deleted => ChangeStatus::Deleted,
                    FileStatus::Skipped => ChangeStatus::Skipped,
                },
                backup_path: None,
                error: None,
            })
            .collect();
        changes.extend(report.errors.iter().map(|e| FileChange {
            file: e.file.clone(),
            status: ChangeStatus::Error,
            backup_path: None,
            error: Some(e.error.clone()),
        }));

        ChangeOutcome {
            success: report.success,
            files_modified: report.successful_files,
            changes,
            error: (!report.success).then(|| format!("{} file(s) failed to apply", report.failed_files)),
            raw_preview: None,
        }
    }

    /// Repeat the whole request until success or attempts are exhausted,
    /// returning the last attempt's outcome either way.
    pub async fn modify_with_retry(
        &self,
        instruction: &str,
        files: &[PathBuf],
        max_attempts: usize,
    ) -> ChangeOutcome {
        let attempts = max_attempts.max(1);
        let mut outcome = self.modify(instruction, files).await;

        for attempt in 1..attempts {
            if outcome.success {
                break;
            }
            warn!(attempt, "change request failed, retrying");
            outcome = self.modify(instruction, files).await;
        }

        outcome
    }

    fn apply_rewrites(&self, rewrites: Vec<FileRewrite>) -> ChangeOutcome {
        let mut changes = Vec::new();
        let mut files_modified = 0usize;

        for rewrite in rewrites {
            let abs = self.resolve(&rewrite.path);
            let rel = self.display_path(&abs);
            let exists = abs.exists();

            if exists {
                if let Ok(current) = fs::read_to_string(&abs) {
                    if current == rewrite.new_content {
                        changes.push(FileChange {
                            file: rel,
                            status: ChangeStatus::Unchanged,
                            backup_path: None,
                            error: None,
                        });
                        continue;
                    }
                }
            }

            if self.dry_run {
                changes.push(FileChange {
                    file: rel,
                    status: ChangeStatus::WouldModify,
                    backup_path: None,
                    error: None,
                });
                files_modified += 1;
                continue;
            }

            let backup_path = if self.create_backup && exists {
                self.backup(&abs)
            } else {
                None
            };

            match self.write(&abs, &rewrite.new_content) {
                Ok(()) => {
                    info!(file = %rel, created = !exists, "wrote replacement content");
                    changes.push(FileChange {
                        file: rel,
                        status: if exists { ChangeStatus::Modified } else { ChangeStatus::Created },
                        backup_path,
                        error: None,
                    });
                    files_modified += 1;
                }
                Err(err) => {
                    warn!(file = %rel, error = %err, "failed to write file");
                    changes.push(FileChange {
                        file: rel,
                        status: ChangeStatus::Error,
                        backup_path,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        ChangeOutcome {
            success: files_modified > 0,
            files_modified,
            changes,
            error: None,
            raw_preview: None,
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() { p.to_path_buf() } else { self.base_dir.join(p) }
    }

    fn display_path(&self, abs: &Path) -> String {
        abs.strip_prefix(&self.base_dir)
            .unwrap_or(abs)
            .to_string_lossy()
            .into_owned()
    }

    fn backup(&self, path: &Path) -> Option<String> {
        let backup = PathBuf::from(format!("{}{}", path.display(), BACKUP_SUFFIX));
        match fs::copy(path, &backup) {
            Ok(_) => Some(backup.to_string_lossy().into_owned()),
            Err(err) => {
                warn!(file = %path.display(), error = %err, "backup failed");
                None
            }
        }
    }

    fn write(&self, path: &Path, content: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
    }

    fn build_file_context(&self, files: &[PathBuf]) -> String {
        let mut parts = Vec::new();

        for file in files {
            let abs = if file.is_absolute() { file.clone() } else { self.base_dir.join(file) };
            let rel = self.display_path(&abs);

            let content = fs::read_to_string(&abs)
                .unwrap_or_else(|e| format!("# error reading file: {e}"));

            let lines: Vec<&str> = content.lines().collect();
            let body = if lines.len() > MAX_CONTEXT_LINES_PER_FILE {
                let mut truncated = lines[..MAX_CONTEXT_LINES_PER_FILE].join("\n");
                truncated.push_str(&format!(
                    "\n... (truncated, {} more lines)",
                    lines.len() - MAX_CONTEXT_LINES_PER_FILE
                ));
                truncated
            } else {
                content
            };

            parts.push(format!("=== File: {rel} ===\n{body}\n"));
        }

        parts.join("\n")
    }
}

fn whole_file_prompt(instruction: &str, context: &str) -> String {
    format!(
        r#"You are an expert software engineer. Modify the provided code files based on the user's instructions.

USER INSTRUCTIONS:
{instruction}

CURRENT CODE:
{context}

TASK:
For each file that needs changes, provide the COMPLETE new file content.

Return a JSON object with this structure:
{{
  "files": [
    {{
      "path": "relative/path/to/file",
      "new_content": "complete new file content here"
    }}
  ]
}}

IMPORTANT:
- Return ONLY valid JSON, no additional text or markdown
- Include COMPLETE file content, not just changes
- Preserve formatting, indentation, and code style
- Make minimal, focused changes that address the instructions
- Omit files that don't need changes
- Escape newlines, tabs, backslashes, and double quotes so every field is a valid JSON string
"#
    )
}

fn diff_prompt(instruction: &str, context: &str) -> String {
    format!(
        r#"You are an expert software engineer. Produce a git-style unified diff implementing the requested change.

USER INSTRUCTIONS:
{instruction}

CURRENT CODE:
{context}

TASK:
Return ONLY a unified diff (git format) that applies cleanly to the files above. Use `diff --git a/path b/path` headers, `@@ -old,+new @@` hunk headers, and correct context lines. No prose.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::mock::MockOracle;
    use tempfile::TempDir;

    fn modifier(oracle: &MockOracle, dir: &TempDir) -> CodeModifier {
        CodeModifier::new(Arc::new(oracle.clone()), dir.path())
    }

    fn rewrite_response(path: &str, content: &str) -> String {
        serde_json::json!({ "files": [{ "path": path, "new_content": content }] }).to_string()
    }

    #[tokio::test]
    async fn whole_file_protocol_writes_and_backs_up() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.py"), "print('old')\n").unwrap();

        let oracle = MockOracle::new();
        oracle.push_text(format!(
            "```json\n{}\n```",
            rewrite_response("main.py", "print('new')\n")
        ));

        let outcome = modifier(&oracle, &dir)
            .modify("change the greeting", &[PathBuf::from("main.py")])
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.files_modified, 1);
        assert_eq!(outcome.changes[0].status, ChangeStatus::Modified);
        assert!(outcome.changes[0].backup_path.is_some());
        assert_eq!(fs::read_to_string(dir.path().join("main.py")).unwrap(), "print('new')\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("main.py.backup")).unwrap(),
            "print('old')\n"
        );
    }

    #[tokio::test]
    async fn identical_content_is_reported_unchanged() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("same.py"), "x = 1\n").unwrap();

        let oracle = MockOracle::new();
        oracle.push_text(rewrite_response("same.py", "x = 1\n"));

        let outcome = modifier(&oracle, &dir)
            .modify("noop", &[PathBuf::from("same.py")])
            .await;

        // Nothing written means zero modified files.
        assert!(!outcome.success);
        assert_eq!(outcome.files_modified, 0);
        assert_eq!(outcome.changes[0].status, ChangeStatus::Unchanged);
        assert!(!dir.path().join("same.py.backup").exists());
    }

    #[tokio::test]
    async fn missing_file_is_created() {
        let dir = TempDir::new().unwrap();
        let oracle = MockOracle::new();
        oracle.push_text(rewrite_response("pkg/new_mod.py", "def f():\n    pass\n"));

        let outcome = modifier(&oracle, &dir)
            .modify("add module", &[PathBuf::from("pkg/new_mod.py")])
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.changes[0].status, ChangeStatus::Created);
        assert!(dir.path().join("pkg/new_mod.py").exists());
    }

    #[tokio::test]
    async fn oracle_failure_yields_soft_failure() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.py"), "a\n").unwrap();

        let oracle = MockOracle::new();
        oracle.push_error(OracleError::command_failed(1, "model overloaded"));

        let outcome = modifier(&oracle, &dir).modify("do it", &[PathBuf::from("a.py")]).await;

        assert!(!outcome.success);
        assert_eq!(outcome.files_modified, 0);
        assert!(outcome.error.as_deref().unwrap().contains("model overloaded"));
        // The file is untouched.
        assert_eq!(fs::read_to_string(dir.path().join("a.py")).unwrap(), "a\n");
    }

    #[tokio::test]
    async fn malformed_payload_keeps_a_preview() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.py"), "a\n").unwrap();

        let oracle = MockOracle::new();
        oracle.push_text("I could not produce JSON, sorry.");

        let outcome = modifier(&oracle, &dir).modify("do it", &[PathBuf::from("a.py")]).await;

        assert!(!outcome.success);
        assert!(outcome.raw_preview.as_deref().unwrap().contains("could not produce"));
    }

    #[tokio::test]
    async fn empty_inputs_are_rejected() {
        let dir = TempDir::new().unwrap();
        let oracle = MockOracle::new();
        let m = modifier(&oracle, &dir);

        let outcome = m.modify("  ", &[PathBuf::from("a.py")]).await;
        assert!(!outcome.success);

        let outcome = m.modify("do it", &[]).await;
        assert!(!outcome.success);
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn retry_repeats_whole_request_until_success() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.py"), "a\n").unwrap();

        let oracle = MockOracle::new();
        oracle.push_error(OracleError::exec("spawn failed"));
        oracle.push_text(rewrite_response("a.py", "b\n"));

        let outcome = modifier(&oracle, &dir)
            .modify_with_retry("do it", &[PathBuf::from("a.py")], 3)
            .await;

        assert!(outcome.success);
        assert_eq!(oracle.call_count(), 2);
    }

    #[tokio::test]
    async fn retry_returns_last_failure_when_exhausted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.py"), "a\n").unwrap();

        let oracle = MockOracle::new();
        oracle.push_error(OracleError::exec("one"));
        oracle.push_error(OracleError::exec("two"));

        let outcome = modifier(&oracle, &dir)
            .modify_with_retry("do it", &[PathBuf::from("a.py")], 2)
            .await;

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("two"));
        assert_eq!(oracle.call_count(), 2);
    }

    #[tokio::test]
    async fn diff_protocol_round_trips_through_the_applier() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "one\ntwo\n").unwrap();

        let diff = "\
diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -1,2 +1,2 @@
-one
+ONE
 two
";
        let oracle = MockOracle::new();
        oracle.push_text(format!("```diff\n{diff}```"));

        let outcome = modifier(&oracle, &dir)
            .modify_via_diff("capitalize", &[PathBuf::from("a.txt")])
            .await;

        assert!(outcome.success, "outcome: {outcome:?}");
        assert_eq!(outcome.changes[0].status, ChangeStatus::Modified);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "ONE\ntwo\n");
    }

    #[tokio::test]
    async fn diff_protocol_unparsable_response_fails_softly() {
        let dir = TempDir::new().unwrap();
        let oracle = MockOracle::new();
        oracle.push_text("this is not a diff at all");

        let outcome = modifier(&oracle, &dir)
            .modify_via_diff("whatever", &[PathBuf::from("a.txt")])
            .await;

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("no file changes found"));
    }
}
