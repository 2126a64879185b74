//! Structured patch model: unified-diff parsing and verified application
//!
//! A patch is modeled as a `PatchSet` of per-file `FileEdit`s, each made
//! of `Hunk`s of tagged lines. The parser turns git-style diff text into
//! this model; the applier replays it against a directory with strict
//! positional and content verification.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod applier;
pub mod parser;

pub use applier::{ApplyReport, FileFailure, FileOutcome, FileStatus, PatchApplier};
pub use parser::parse;

/// How a single patch line relates to the original file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineKind {
    /// Unchanged line, present in both versions; must match the original.
    Context,
    /// Line removed from the original; must match before removal.
    Delete,
    /// Line inserted into the new version.
    Add,
}

/// One tagged line inside a hunk. `text` carries the content without the
/// tag prefix and without a trailing newline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchLine {
    pub kind: LineKind,
    pub text: String,
}

impl PatchLine {
    pub fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self { kind, text: text.into() }
    }

    /// The diff prefix character for this line.
    pub fn tag(&self) -> char {
        match self.kind {
            LineKind::Context => ' ',
            LineKind::Delete => '-',
            LineKind::Add => '+',
        }
    }
}

/// A contiguous block of change within one file.
///
/// `old_start`/`new_start` are 1-based. Replaying the `Context` and
/// `Delete` lines in order starting at `old_start` reproduces
/// `old_count` original lines; `Context` and `Add` lines produce
/// `new_count` result lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<PatchLine>,
}

impl Hunk {
    /// Net change in file length introduced by this hunk.
    pub fn line_delta(&self) -> isize {
        self.new_count as isize - self.old_count as isize
    }
}

/// All hunks touching a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    /// Path on the pre-change side; `None` for newly created files.
    pub old_path: Option<String>,
    /// Path on the post-change side; `None` for deleted files.
    pub new_path: Option<String>,
    pub is_new: bool,
    pub is_deleted: bool,
    /// Hunks in source order. The applier re-sorts by `old_start` before
    /// applying, since generation order is not guaranteed monotonic.
    pub hunks: Vec<Hunk>,
}

impl FileEdit {
    /// The path this edit targets on disk.
    pub fn target_path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or("")
    }
}

/// An ordered set of file edits produced by one change request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSet {
    pub files: Vec<FileEdit>,
}

impl PatchSet {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

/// Malformed patch text structure. Fatal to the parse call; never
/// retried internally.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty diff content")]
    Empty,

    #[error("invalid diff header at line {line}: {text}")]
    FileHeader { line: usize, text: String },

    #[error("invalid hunk header at line {line}: {text}")]
    HunkHeader { line: usize, text: String },
}

/// Content mismatch or out-of-range hunk during application. Fatal to
/// one file's application; the applier converts it into a per-file
/// failure entry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApplyError {
    #[error("line mismatch at line {line}: expected '{expected}', got '{actual}'")]
    LineMismatch { line: usize, expected: String, actual: String },

    #[error("hunk extends beyond file length at line {line}")]
    PastEndOfFile { line: usize },

    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("failed to apply hunk at line {hunk_start}: {source}")]
    Hunk {
        hunk_start: usize,
        #[source]
        source: Box<ApplyError>,
    },

    #[error("io error on {path}: {message}")]
    Io { path: String, message: String },
}

impl ApplyError {
    pub(crate) fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io { path: path.into(), message: err.to_string() }
    }

    pub(crate) fn in_hunk(self, hunk_start: usize) -> Self {
        Self::Hunk { hunk_start, source: Box::new(self) }
    }
}
