//! Branch-level promotion pipeline.
//!
//! [`PromotionPipeline`] selects the target branches of an action, checks
//! each one out in turn and dispatches to the steal/backport engine, the CI
//! router or the release strategy. Pushes are batched per run.

pub mod action;
mod promote;
mod runner;
mod steal;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backport::Provenance;
use crate::checkpoint::StartMode;
use crate::domain::{CiBuild, CommitId, PRIMARY_SUFFIX};
use crate::release::ReleaseKind;

pub use action::{Action, ActionSpec, Scope};
pub use runner::PromotionPipeline;

/// Repeat monitoring until interrupted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    pub period: Duration,
    /// Stop after this many cycles; `None` runs until Ctrl-C.
    pub iterations: Option<u32>,
}

/// Per-run options shared by every action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub suffix: String,
    /// Skip branches older than this major version.
    pub base_version: Option<u64>,
    /// Only versions matching this regex.
    pub version_filter: Option<String>,
    /// Run on this branch only.
    pub branch: Option<String>,
    /// Fetch remotes before actions that need it.
    pub fetch: bool,
    /// Commits for `cp`.
    pub commits: Vec<String>,
    pub start: StartMode,
    /// Keep backported messages as picked.
    pub no_edit: bool,
    pub force: bool,
    pub skip_ci_check: bool,
    /// Source suffix for `merge`.
    pub merge_from: Option<String>,
    /// `delete` removes the validation remote branch instead of the local one.
    pub delete_remote: bool,
    pub release: ReleaseKind,
    pub watch: Option<WatchOptions>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            suffix: PRIMARY_SUFFIX.to_string(),
            base_version: None,
            version_filter: None,
            branch: None,
            fetch: true,
            commits: Vec::new(),
            start: StartMode::Default,
            no_edit: false,
            force: false,
            skip_ci_check: false,
            merge_from: None,
            delete_remote: false,
            release: ReleaseKind::Stable,
            watch: None,
        }
    }
}

/// Position of a branch in the promotion flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionState {
    Local,
    ValidationPushed,
    CiPassed,
    StablePushed,
    Released,
}

/// What happened to one upstream commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommitOutcome {
    Applied {
        head: CommitId,
        provenance: Provenance,
    },
    AlreadyApplied,
    Irrelevant,
    Blacklisted,
    /// The operator resolved a conflict by hand.
    Resolved { head: CommitId },
    /// The operator gave up on the commit.
    Dropped { blacklisted: bool },
}

impl CommitOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CommitOutcome::Applied { .. } => "applied",
            CommitOutcome::AlreadyApplied => "already_applied",
            CommitOutcome::Irrelevant => "irrelevant",
            CommitOutcome::Blacklisted => "blacklisted",
            CommitOutcome::Resolved { .. } => "resolved",
            CommitOutcome::Dropped { .. } => "dropped",
        }
    }

    /// Whether the operator had to step in.
    pub fn is_escalated(&self) -> bool {
        matches!(
            self,
            CommitOutcome::Resolved { .. } | CommitOutcome::Dropped { .. }
        )
    }
}

/// Result of `steal` or `cp` on one branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StealReport {
    pub start: Option<CommitId>,
    pub end: Option<CommitId>,
    pub outcomes: Vec<(CommitId, CommitOutcome)>,
    pub checkpoint_advanced: bool,
}

impl StealReport {
    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, CommitOutcome::Applied { .. }))
    }

    pub fn escalated(&self) -> usize {
        self.count(CommitOutcome::is_escalated)
    }

    /// Every commit processed without operator intervention.
    pub fn is_complete(&self) -> bool {
        self.escalated() == 0
    }

    pub fn outcome_of(&self, commit: &CommitId) -> Option<&CommitOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == commit)
            .map(|(_, o)| o)
    }

    fn count(&self, pred: impl Fn(&CommitOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Result of an action on one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BranchOutcome {
    Stolen(StealReport),
    Picked(StealReport),
    Listed { commits: usize },
    /// A refspec joined the run's push batch.
    Queued { refspec: String },
    NothingToPush,
    CiState {
        build: CiBuild,
        state: Option<PromotionState>,
    },
    /// The operator answered no.
    Declined,
    Skipped { reason: String },
    UpToDate,
    Reset,
    Created,
    AlreadyExists,
    Deleted,
    Merged,
    Pulled,
    Released { tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchReport {
    pub branch: String,
    pub outcome: BranchOutcome,
}

/// One push invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushBatch {
    pub remote: String,
    pub refspecs: Vec<String>,
    pub force: bool,
}

/// Result of a global action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GlobalOutcome {
    Branches { versions: Vec<String> },
    Submitted { tags: Vec<String> },
    NothingToSubmit,
}

/// Everything one run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub action: Action,
    pub branches: Vec<BranchReport>,
    pub pushes: Vec<PushBatch>,
    pub global: Option<GlobalOutcome>,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>, action: Action) -> Self {
        Self {
            run_id: run_id.into(),
            action,
            branches: Vec::new(),
            pushes: Vec::new(),
            global: None,
        }
    }

    pub fn outcome(&self, branch: &str) -> Option<&BranchOutcome> {
        self.branches
            .iter()
            .find(|r| r.branch == branch)
            .map(|r| &r.outcome)
    }
}
