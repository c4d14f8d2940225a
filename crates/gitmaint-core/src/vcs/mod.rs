//! The version-control capability consumed by the engine.
//!
//! The engine never composes shell text: everything it needs from the
//! repository goes through [`VersionControl`]. [`git::GitCli`] drives the
//! `git` binary; [`fake::MemoryVcs`] is an in-memory history graph for tests.

pub mod fake;
pub mod git;

use crate::domain::{Commit, CommitId, VcsError};

pub use fake::MemoryVcs;
pub use git::GitCli;

/// Result type for version-control operations.
pub type VcsResult<T> = std::result::Result<T, VcsError>;

/// Merge strategy option used for backports.
pub const PATIENCE: &str = "patience";

/// A `git log` style query returning commit ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    /// Revisions whose ancestry is listed.
    pub include: Vec<String>,
    /// Revisions whose ancestry is excluded.
    pub exclude: Vec<String>,
    /// Fixed-string filter on the commit message.
    pub grep: Option<String>,
    pub no_merges: bool,
    /// Oldest first instead of newest first.
    pub reverse: bool,
}

impl LogQuery {
    /// Commits reachable from `to` but not from `from` (`from..to`).
    pub fn range(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            include: vec![to.into()],
            exclude: vec![from.into()],
            ..Self::default()
        }
    }

    pub fn grep(mut self, pattern: impl Into<String>) -> Self {
        self.grep = Some(pattern.into());
        self
    }

    pub fn no_merges(mut self) -> Self {
        self.no_merges = true;
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// Options for a single cherry-pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickOptions {
    /// `-X<option>` passed to the recursive strategy.
    pub strategy_option: Option<String>,
    /// Record `(cherry picked from commit …)` in the message.
    pub record_origin: bool,
}

impl PickOptions {
    /// Recursive strategy with patience diff, recording the origin.
    pub fn backport() -> Self {
        Self {
            strategy_option: Some(PATIENCE.to_string()),
            record_origin: true,
        }
    }

    /// Plain cherry-pick as an operator would type it.
    pub fn plain() -> Self {
        Self {
            strategy_option: None,
            record_origin: false,
        }
    }
}

/// Outcome of a cherry-pick, merge or rebase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    Applied,
    /// The operation stopped; the working tree may hold partial edits.
    Failed,
}

impl ApplyStatus {
    pub fn applied(self) -> bool {
        self == ApplyStatus::Applied
    }
}

/// Repository operations used by the correlation, backport and promotion
/// layers.
///
/// Lookups that can legitimately miss (`resolve`, `config`, `notes_read`)
/// return `Option` rather than an error.
pub trait VersionControl: Send + Sync {
    /// Identity of the repository (working tree directory name).
    fn repo_name(&self) -> String;

    /// Resolve a revision to a commit id.
    fn resolve(&self, rev: &str) -> Option<CommitId>;

    /// Whether `ancestor` is reachable from `descendant` (or equal to it).
    fn is_ancestor(&self, ancestor: &CommitId, descendant: &CommitId) -> VcsResult<bool>;

    fn commit(&self, rev: &str) -> VcsResult<Commit>;

    fn log(&self, query: &LogQuery) -> VcsResult<Vec<CommitId>>;

    fn head(&self) -> VcsResult<CommitId>;

    fn checkout(&self, branch: &str) -> VcsResult<()>;

    fn cherry_pick(&self, commit: &CommitId, opts: &PickOptions) -> VcsResult<ApplyStatus>;

    /// No tracked file differs from HEAD and no index change is pending.
    fn is_clean(&self) -> VcsResult<bool>;

    fn reset_hard(&self, rev: &str) -> VcsResult<()>;

    /// Replace the message of the HEAD commit (signed-off).
    fn amend_message(&self, message: &str) -> VcsResult<()>;

    fn merge(&self, rev: &str) -> VcsResult<ApplyStatus>;

    fn rebase(&self, onto: &str) -> VcsResult<ApplyStatus>;

    fn create_branch(&self, name: &str, start: &str) -> VcsResult<()>;

    fn delete_branch(&self, name: &str) -> VcsResult<()>;

    fn local_branches(&self) -> VcsResult<Vec<String>>;

    /// Branch names on `remote`, without the remote prefix.
    fn remote_branches(&self, remote: &str) -> VcsResult<Vec<String>>;

    /// Create or move a lightweight tag.
    fn set_tag(&self, name: &str, target: &CommitId) -> VcsResult<()>;

    /// Create an annotated (optionally signed) tag on HEAD.
    fn create_release_tag(&self, name: &str, message: &str, sign: bool) -> VcsResult<()>;

    /// Local tags matching a glob, optionally limited to those merged into `rev`.
    fn tags(&self, pattern: &str, merged_into: Option<&str>) -> VcsResult<Vec<String>>;

    fn remote_tags(&self, remote: &str) -> VcsResult<Vec<String>>;

    fn notes_read(&self, namespace: &str, commit: &CommitId) -> VcsResult<Option<String>>;

    fn notes_append(&self, namespace: &str, commit: &CommitId, text: &str) -> VcsResult<()>;

    fn fetch(&self, remote: &str) -> VcsResult<()>;

    /// One push invocation for all refspecs.
    fn push(&self, remote: &str, refspecs: &[String], force: bool) -> VcsResult<()>;

    fn config(&self, key: &str) -> VcsResult<Option<String>>;

    /// `(key, value)` pairs whose key matches `pattern`.
    fn config_regexp(&self, pattern: &str) -> VcsResult<Vec<(String, String)>>;

    fn remote_url(&self, remote: &str) -> VcsResult<Option<String>>;
}
