//! Verified application of a `PatchSet` against a directory
//!
//! Per-file failures are isolated: one file's mismatch becomes an entry
//! in the aggregate report and the remaining files are still applied.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ApplyError, FileEdit, Hunk, LineKind, PatchSet};

/// Applies structured edits to files under a base directory.
pub struct PatchApplier {
    base_dir: PathBuf,
    dry_run: bool,
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Created,
    Modified,
    Deleted,
    /// Deletion of an already-absent file; treated as satisfied.
    Skipped,
}

/// Per-file application result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub file: String,
    pub status: FileStatus,
    pub lines_added: usize,
    pub lines_removed: usize,
    pub message: String,
}

/// Per-file application failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

/// Aggregate result of applying one `PatchSet`.
///
/// `success == false` does not mean nothing was written: files that
/// applied cleanly before a failing one stay modified. Callers must
/// inspect `results` individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
    pub success: bool,
    pub total_files: usize,
    pub successful_files: usize,
    pub failed_files: usize,
    pub results: Vec<FileOutcome>,
    pub errors: Vec<FileFailure>,
    pub dry_run: bool,
}

impl PatchApplier {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self { base_dir: base_dir.as_ref().to_path_buf(), dry_run: false }
    }

    /// Verify and compute everything without writing to disk.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Apply every file edit, collecting per-file outcomes and failures.
    pub fn apply(&self, patch: &PatchSet) -> ApplyReport {
        let mut results = Vec::new();
        let mut errors = Vec::new();

        for edit in &patch.files {
            match self.apply_file(edit) {
                Ok(outcome) => {
                    debug!(file = %outcome.file, status = ?outcome.status, "applied file edit");
                    results.push(outcome);
                }
                Err(err) => {
                    warn!(file = %edit.target_path(), error = %err, "file edit failed");
                    errors.push(FileFailure {
                        file: edit.target_path().to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        ApplyReport {
            success: errors.is_empty(),
            total_files: patch.files.len(),
            successful_files: results.len(),
            failed_files: errors.len(),
            results,
            errors,
            dry_run: self.dry_run,
        }
    }

    fn apply_file(&self, edit: &FileEdit) -> Result<FileOutcome, ApplyError> {
        let rel = edit.target_path().to_string();
        let path = self.base_dir.join(&rel);

        if edit.is_deleted {
            return self.delete_file(&path, &rel);
        }

        if edit.is_new {
            return self.create_file(edit, &path, &rel);
        }

        self.modify_file(edit, &path, &rel)
    }

    fn delete_file(&self, path: &Path, rel: &str) -> Result<FileOutcome, ApplyError> {
        if !path.exists() {
            return Ok(FileOutcome {
                file: rel.to_string(),
                status: FileStatus::Skipped,
                lines_added: 0,
                lines_removed: 0,
                message: format!("file not found (already deleted?): {rel}"),
            });
        }

        if !self.dry_run {
            fs::remove_file(path).map_err(|e| ApplyError::io(rel, e))?;
        }

        Ok(FileOutcome {
            file: rel.to_string(),
            status: FileStatus::Deleted,
            lines_added: 0,
            lines_removed: 0,
            message: format!("deleted file: {rel}"),
        })
    }

    fn create_file(&self, edit: &FileEdit, path: &Path, rel: &str) -> Result<FileOutcome, ApplyError> {
        // Content is every Add line in hunk order; prior file contents,
        // if any, are overwritten.
        let lines: Vec<&str> = edit
            .hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .filter(|l| l.kind == LineKind::Add)
            .map(|l| l.text.as_str())
            .collect();

        if !self.dry_run {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| ApplyError::io(rel, e))?;
            }
            let mut content = lines.join("\n");
            if !content.is_empty() {
                content.push('\n');
            }
            fs::write(path, content).map_err(|e| ApplyError::io(rel, e))?;
        }

        Ok(FileOutcome {
            file: rel.to_string(),
            status: FileStatus::Created,
            lines_added: lines.len(),
            lines_removed: 0,
            message: format!("created new file: {rel}"),
        })
    }

    fn modify_file(&self, edit: &FileEdit, path: &Path, rel: &str) -> Result<FileOutcome, ApplyError> {
        if !path.exists() {
            return Err(ApplyError::FileNotFound { path: rel.to_string() });
        }

        let content = fs::read_to_string(path).map_err(|e| ApplyError::io(rel, e))?;
        let had_trailing_newline = content.is_empty() || content.ends_with('\n');
        let mut buffer: Vec<String> = content.lines().map(String::from).collect();

        // Hunks are expressed against the original file's numbering, but
        // every applied hunk changes the buffer's length. Re-sort by
        // old_start and carry the cumulative delta forward.
        let mut hunks: Vec<&Hunk> = edit.hunks.iter().collect();
        hunks.sort_by_key(|h| h.old_start);

        let mut offset: isize = 0;
        for hunk in hunks {
            let effective_start = hunk.old_start as isize + offset;
            buffer = apply_hunk(&buffer, hunk, effective_start.max(1) as usize)
                .map_err(|e| e.in_hunk(hunk.old_start))?;
            offset += hunk.line_delta();
        }

        if !self.dry_run {
            let mut out = buffer.join("\n");
            if had_trailing_newline && !out.is_empty() {
                out.push('\n');
            }
            fs::write(path, out).map_err(|e| ApplyError::io(rel, e))?;
        }

        let lines_added = count_lines(edit, LineKind::Add);
        let lines_removed = count_lines(edit, LineKind::Delete);

        Ok(FileOutcome {
            file: rel.to_string(),
            status: FileStatus::Modified,
            lines_added,
            lines_removed,
            message: format!("modified file: {rel}"),
        })
    }
}

fn count_lines(edit: &FileEdit, kind: LineKind) -> usize {
    edit.hunks
        .iter()
        .flat_map(|h| h.lines.iter())
        .filter(|l| l.kind == kind)
        .count()
}

/// Replay one hunk against a line buffer, starting at `start` (1-based).
///
/// Context and Delete lines must match the buffer at the cursor; Add
/// lines insert without consuming input.
fn apply_hunk(buffer: &[String], hunk: &Hunk, start: usize) -> Result<Vec<String>, ApplyError> {
    let start_idx = start - 1;
    let mut result: Vec<String> = buffer.get(..start_idx.min(buffer.len())).unwrap_or(&[]).to_vec();
    let mut cursor = start_idx;

    for line in &hunk.lines {
        match line.kind {
            LineKind::Context | LineKind::Delete => {
                let actual = buffer
                    .get(cursor)
                    .ok_or(ApplyError::PastEndOfFile { line: cursor + 1 })?;
                if actual.trim_end_matches('\n') != line.text.trim_end_matches('\n') {
                    return Err(ApplyError::LineMismatch {
                        line: cursor + 1,
                        expected: line.text.clone(),
                        actual: actual.clone(),
                    });
                }
                if line.kind == LineKind::Context {
                    result.push(actual.clone());
                }
                cursor += 1;
            }
            LineKind::Add => {
                result.push(line.text.clone());
            }
        }
    }

    result.extend_from_slice(&buffer[cursor.min(buffer.len())..]);
    Ok(result)
}
