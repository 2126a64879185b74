//! Git baseline tracking using git2
//!
//! A workspace gets a repository on first use so that every change made
//! by the workflow can be diffed against the last known-good state.

use anyhow::{Context, Result};
use git2::{DiffFormat, DiffOptions, IndexAddOption, Repository, Signature, StatusOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::oracle::change::BACKUP_SUFFIX;

const NO_CHANGES: &str = "# No changes detected";

/// Baseline state of a working directory, backed by a git repository.
pub struct Baseline {
    repo: Repository,
    dir: PathBuf,
}

impl Baseline {
    /// Open the repository at `dir`, initializing one (with an initial
    /// commit) when none exists yet.
    pub fn ensure(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();

        let repo = match Repository::open(&dir) {
            Ok(repo) => repo,
            Err(_) => {
                info!(dir = %dir.display(), "initializing baseline repository");
                Repository::init(&dir).context("Failed to initialize baseline repository")?
            }
        };

        let baseline = Self { repo, dir };
        if baseline.repo.head().is_err() {
            baseline.commit_all("Baseline snapshot")?;
        }
        Ok(baseline)
    }

    /// Open an existing repository without initializing.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let repo = Repository::open(&dir).context("Failed to open baseline repository")?;
        Ok(Self { repo, dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stage everything and commit. Returns `None` when the tree is
    /// unchanged and there is nothing to commit.
    pub fn commit_all(&self, message: &str) -> Result<Option<String>> {
        let mut index = self.repo.index().context("Failed to get repository index")?;
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .context("Failed to stage files")?;
        index.write().context("Failed to write index")?;

        let tree_id = index.write_tree().context("Failed to write tree")?;
        let tree = self.repo.find_tree(tree_id).context("Failed to find tree")?;
        let sig = self.signature()?;

        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        if let Some(ref parent) = parent {
            if parent.tree_id() == tree_id {
                debug!("nothing to commit");
                return Ok(None);
            }
        }

        let parents: Vec<_> = parent.iter().collect();
        let commit_id = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .context("Failed to create commit")?;

        info!(commit = %commit_id, "committed baseline");
        Ok(Some(commit_id.to_string()))
    }

    /// Unified diff of the working tree against HEAD, with backup files
    /// excluded. Returns a sentinel line when nothing changed.
    pub fn diff_from_head(&self) -> Result<String> {
        let head_tree = self
            .repo
            .head()
            .context("Failed to get HEAD")?
            .peel_to_tree()
            .context("Failed to get HEAD tree")?;

        let mut opts = DiffOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);

        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(Some(&head_tree), Some(&mut opts))
            .context("Failed to diff against HEAD")?;

        let mut text = String::new();
        diff.print(DiffFormat::Patch, |delta, _hunk, line| {
            let is_backup = delta
                .new_file()
                .path()
                .and_then(|p| p.to_str())
                .map(|p| p.ends_with(BACKUP_SUFFIX))
                .unwrap_or(false);
            if !is_backup {
                match line.origin() {
                    '+' | '-' | ' ' => text.push(line.origin()),
                    _ => {}
                }
                text.push_str(&String::from_utf8_lossy(line.content()));
            }
            true
        })
        .context("Failed to render diff")?;

        if text.trim().is_empty() {
            return Ok(NO_CHANGES.to_string());
        }
        Ok(text)
    }

    /// Paths changed in the working tree relative to HEAD, backup files
    /// excluded.
    pub fn modified_files(&self) -> Result<Vec<PathBuf>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true).include_ignored(false);

        let statuses =
            self.repo.statuses(Some(&mut opts)).context("Failed to get repository status")?;

        let mut files: Vec<PathBuf> = statuses
            .iter()
            .filter_map(|entry| entry.path().map(PathBuf::from))
            .filter(|path| {
                !path.to_string_lossy().ends_with(BACKUP_SUFFIX)
            })
            .collect();

        files.sort();
        Ok(files)
    }

    fn signature(&self) -> Result<Signature<'_>> {
        Signature::now("codeloop", "codeloop@localhost").context("Failed to create signature")
    }
}

/// True when the diff text carries no actual changes.
pub fn is_empty_diff(diff: &str) -> bool {
    diff.trim().is_empty() || diff.trim() == NO_CHANGES
}
