//! Single-pass parser for git-style unified diff text

use once_cell::sync::Lazy;
use regex::Regex;

use super::{FileEdit, Hunk, LineKind, ParseError, PatchLine, PatchSet};

static FILE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^diff --git a/(.*?) b/(.*?)$").unwrap());

static HUNK_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap());

/// Parse unified-diff text into a structured `PatchSet`.
///
/// The scan is a small state machine: between files, in a file awaiting
/// its first hunk, and in a hunk. Lines inside a hunk starting with `+`,
/// `-`, or a space are content; `\`-prefixed markers ("No newline at end
/// of file") are discarded; anything else is skipped. Pure function of
/// its input.
pub fn parse(text: &str) -> Result<PatchSet, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut files: Vec<FileEdit> = Vec::new();
    let mut current_file: Option<FileEdit> = None;
    let mut current_hunk: Option<Hunk> = None;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;

        if line.starts_with("diff --git") {
            flush_hunk(&mut current_file, &mut current_hunk);
            if let Some(file) = current_file.take() {
                files.push(file);
            }

            let caps = FILE_HEADER.captures(line).ok_or_else(|| ParseError::FileHeader {
                line: line_no,
                text: line.to_string(),
            })?;

            current_file = Some(FileEdit {
                old_path: Some(caps[1].to_string()),
                new_path: Some(caps[2].to_string()),
                is_new: false,
                is_deleted: false,
                hunks: Vec::new(),
            });
        } else if line.starts_with("new file mode") {
            if let Some(file) = current_file.as_mut() {
                file.is_new = true;
                file.old_path = None;
            }
        } else if line.starts_with("deleted file mode") {
            if let Some(file) = current_file.as_mut() {
                file.is_deleted = true;
                file.new_path = None;
            }
        } else if line.starts_with("@@") {
            flush_hunk(&mut current_file, &mut current_hunk);

            let caps = HUNK_HEADER.captures(line).ok_or_else(|| ParseError::HunkHeader {
                line: line_no,
                text: line.to_string(),
            })?;

            // Omitted counts default to 1, matching git's shorthand.
            current_hunk = Some(Hunk {
                old_start: caps[1].parse().unwrap_or(0),
                old_count: caps.get(2).map_or(1, |m| m.as_str().parse().unwrap_or(1)),
                new_start: caps[3].parse().unwrap_or(0),
                new_count: caps.get(4).map_or(1, |m| m.as_str().parse().unwrap_or(1)),
                lines: Vec::new(),
            });
        } else if let Some(hunk) = current_hunk.as_mut() {
            if let Some(rest) = line.strip_prefix('+') {
                hunk.lines.push(PatchLine::new(LineKind::Add, rest));
            } else if let Some(rest) = line.strip_prefix('-') {
                hunk.lines.push(PatchLine::new(LineKind::Delete, rest));
            } else if let Some(rest) = line.strip_prefix(' ') {
                hunk.lines.push(PatchLine::new(LineKind::Context, rest));
            }
            // "\ No newline at end of file" and anything else: skipped.
        }
    }

    flush_hunk(&mut current_file, &mut current_hunk);
    if let Some(file) = current_file.take() {
        files.push(file);
    }

    Ok(PatchSet { files })
}

fn flush_hunk(file: &mut Option<FileEdit>, hunk: &mut Option<Hunk>) {
    if let (Some(file), Some(hunk)) = (file.as_mut(), hunk.take()) {
        file.hunks.push(hunk);
    }
}
