//! Commit correlation: deciding whether an upstream commit belongs on a
//! stable branch and whether it already landed there.
//!
//! Backports rewrite commit identity, so identity checks always fall back to
//! an exact subject match bounded to the commits added since the stable base.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Branch, Commit, CommitId, Result};
use crate::vcs::{LogQuery, VersionControl};

/// Notes namespace prefix holding per-branch blacklists.
pub const BLACKLIST_NOTES_PREFIX: &str = "refs/notes/maintain/blacklist";

/// Why a commit is or is not relevant to a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Relevance {
    /// The commit fixes a commit present on the branch.
    FixesPresent { fixes: CommitId },
    /// The commit fixes a commit the branch never had.
    FixesAbsent { fixes: CommitId },
    /// Marked for every stable line.
    StableAll,
    /// Marked for lines containing `tag`.
    StableFrom { tag: String, present: bool },
    /// The `stable@` baseline does not exist in this repository.
    UnknownBaseline { tag: String },
    /// No `Fixes:` or `stable@` annotation.
    Unmarked,
}

impl Relevance {
    pub fn is_relevant(&self) -> bool {
        match self {
            Relevance::FixesPresent { .. } | Relevance::StableAll => true,
            Relevance::StableFrom { present, .. } => *present,
            Relevance::FixesAbsent { .. }
            | Relevance::UnknownBaseline { .. }
            | Relevance::Unmarked => false,
        }
    }
}

/// Blacklist notes namespace of a branch.
pub fn blacklist_namespace(branch: &Branch) -> String {
    format!("{BLACKLIST_NOTES_PREFIX}/{}", branch.local)
}

/// Correlation queries against one stable branch.
pub struct CorrelationEngine<'a> {
    vcs: &'a dyn VersionControl,
    branch: &'a Branch,
    stable_base: CommitId,
}

impl<'a> CorrelationEngine<'a> {
    /// `stable_base` bounds every subject search.
    pub fn new(vcs: &'a dyn VersionControl, branch: &'a Branch, stable_base: CommitId) -> Self {
        Self {
            vcs,
            branch,
            stable_base,
        }
    }

    pub fn stable_base(&self) -> &CommitId {
        &self.stable_base
    }

    /// Classify `commit` against the current branch head.
    pub fn classify(&self, commit: &Commit) -> Result<Relevance> {
        let head = self.vcs.head()?;

        if let Some(fixes) = commit.fixes() {
            let relevance = if self.is_already_applied(&fixes, &head)? {
                Relevance::FixesPresent { fixes }
            } else {
                Relevance::FixesAbsent { fixes }
            };
            return Ok(relevance);
        }

        match commit.stable_marker() {
            Some(marker) => match marker.tag {
                None => Ok(Relevance::StableAll),
                Some(tag) => match self.vcs.resolve(&tag) {
                    Some(baseline) => Ok(Relevance::StableFrom {
                        present: self.vcs.is_ancestor(&baseline, &head)?,
                        tag,
                    }),
                    None => {
                        warn!(
                            commit = %commit.id.short(),
                            tag = %tag,
                            "stable@ baseline does not exist in this tree"
                        );
                        Ok(Relevance::UnknownBaseline { tag })
                    }
                },
            },
            None => Ok(Relevance::Unmarked),
        }
    }

    /// Whether `commit` belongs on this branch.
    pub fn is_relevant(&self, commit: &Commit) -> Result<bool> {
        let relevance = self.classify(commit)?;
        debug!(commit = %commit.id.short(), ?relevance, branch = %self.branch.local, "relevance");
        Ok(relevance.is_relevant())
    }

    /// Whether `commit` (or a backport of it) is reachable from `head`.
    pub fn is_already_applied(&self, commit: &CommitId, head: &CommitId) -> Result<bool> {
        let Some(id) = self.vcs.resolve(commit.as_str()) else {
            warn!(commit = %commit, "commit points to a SHA not in tree");
            return Ok(false);
        };

        if self.vcs.is_ancestor(&id, head)? {
            return Ok(true);
        }

        let subject = self.vcs.commit(id.as_str())?.subject;
        self.find_by_subject(&subject, self.stable_base.as_str(), head.as_str())
            .map(|found| found.is_some())
    }

    /// Whether the operator excluded `commit` from this branch.
    pub fn is_blacklisted(&self, commit: &CommitId) -> Result<bool> {
        let note = self
            .vcs
            .notes_read(&blacklist_namespace(self.branch), commit)?;
        Ok(note.is_some_and(|n| !n.trim().is_empty()))
    }

    /// Exclude `commit` from future steals on this branch.
    pub fn blacklist(&self, commit: &CommitId, reason: &str) -> Result<()> {
        self.vcs
            .notes_append(&blacklist_namespace(self.branch), commit, reason)?;
        debug!(commit = %commit.short(), branch = %self.branch.local, "blacklisted");
        Ok(())
    }

    /// Upstream commit a branch-local commit was copied from, looked up by
    /// subject between the stable base and `upstream`.
    pub fn upstream_origin(&self, commit: &Commit, upstream: &str) -> Result<Option<CommitId>> {
        let candidates = self.vcs.log(
            &LogQuery::range(self.stable_base.as_str(), upstream)
                .grep(commit.subject.clone())
                .oldest_first(),
        )?;
        for id in candidates {
            if self.vcs.commit(id.as_str())?.subject == commit.subject {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Newest commit in `from..to` whose subject is exactly `subject`.
    fn find_by_subject(&self, subject: &str, from: &str, to: &str) -> Result<Option<CommitId>> {
        let candidates = self
            .vcs
            .log(&LogQuery::range(from, to).grep(subject.to_string()))?;
        for id in candidates {
            if self.vcs.commit(id.as_str())?.subject == subject {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BranchKind, BranchVersion};
    use crate::vcs::{MemoryVcs, PickOptions};

    fn branch() -> Branch {
        Branch {
            version: BranchVersion::new("5"),
            suffix: "master".to_string(),
            kind: BranchKind::Standard,
            local: "dev/stable-v5/master".to_string(),
            stable_branch: "stable-v5".to_string(),
            validation_remote: "github".to_string(),
            stable_remote: "stable".to_string(),
        }
    }

    /// master: initial - base(v5) ; upstream continues from base.
    fn setup() -> (MemoryVcs, CommitId) {
        let vcs = MemoryVcs::new("repo");
        let base = vcs.commit_on("master", "release 5", "");
        vcs.tag("v5", base.as_str());
        vcs.set_branch("upstream", "master");
        vcs.set_branch("dev/stable-v5/master", "master");
        vcs.checkout("dev/stable-v5/master").unwrap();
        (vcs, base)
    }

    #[test]
    fn test_fixes_present_on_branch() {
        let (vcs, base) = setup();
        let b = branch();
        let engine = CorrelationEngine::new(&vcs, &b, base.clone());
        let body = format!("Fixes: {} (\"release 5\")", base.short());
        let fix = vcs.commit_on("upstream", "fix it", &body);
        let commit = vcs.commit(fix.as_str()).unwrap();
        assert!(matches!(
            engine.classify(&commit).unwrap(),
            Relevance::FixesPresent { .. }
        ));
    }

    #[test]
    fn test_fixes_absent_is_irrelevant_even_with_marker() {
        let (vcs, base) = setup();
        let b = branch();
        let engine = CorrelationEngine::new(&vcs, &b, base);
        let feature = vcs.commit_on("upstream", "new feature", "");
        let body = format!("Fixes: {}\nCc: stable@vger.kernel.org", feature.short());
        let fix = vcs.commit_on("upstream", "fix feature", &body);
        let commit = vcs.commit(fix.as_str()).unwrap();
        assert!(!engine.is_relevant(&commit).unwrap());
    }

    #[test]
    fn test_stable_marker_baselines() {
        let (vcs, base) = setup();
        let b = branch();
        let engine = CorrelationEngine::new(&vcs, &b, base);
        let later = vcs.commit_on("upstream", "release 6", "");
        vcs.tag("v6", later.as_str());

        let all = Commit::new(CommitId::new("aa"), "s", "Cc: stable@linux-rdma.org");
        assert_eq!(engine.classify(&all).unwrap(), Relevance::StableAll);

        let old = Commit::new(CommitId::new("ab"), "s", "Cc: stable@linux-rdma.org # v5+");
        assert!(engine.is_relevant(&old).unwrap());

        let newer = Commit::new(CommitId::new("ac"), "s", "Cc: stable@linux-rdma.org # v6");
        assert!(!engine.is_relevant(&newer).unwrap());

        let unknown = Commit::new(CommitId::new("ad"), "s", "Cc: stable@linux-rdma.org # v99");
        assert_eq!(
            engine.classify(&unknown).unwrap(),
            Relevance::UnknownBaseline {
                tag: "v99".to_string()
            }
        );

        let plain = Commit::new(CommitId::new("ae"), "s", "no annotations");
        assert!(!engine.is_relevant(&plain).unwrap());
    }

    #[test]
    fn test_backported_copy_counts_as_applied() {
        let (vcs, base) = setup();
        let b = branch();
        let engine = CorrelationEngine::new(&vcs, &b, base);
        let up = vcs.commit_on("upstream", "fix: leak", "");
        let head = vcs.head().unwrap();
        assert!(!engine.is_already_applied(&up, &head).unwrap());

        vcs.cherry_pick(&up, &PickOptions::backport()).unwrap();
        let head = vcs.head().unwrap();
        assert!(engine.is_already_applied(&up, &head).unwrap());
    }

    #[test]
    fn test_subject_match_is_exact() {
        let (vcs, base) = setup();
        let b = branch();
        let engine = CorrelationEngine::new(&vcs, &b, base);
        vcs.commit_on("dev/stable-v5/master", "fix: leak in parser v2", "");
        let up = vcs.commit_on("upstream", "fix: leak in parser", "");
        let head = vcs.head().unwrap();
        assert!(!engine.is_already_applied(&up, &head).unwrap());
    }

    #[test]
    fn test_unknown_sha_is_not_applied() {
        let (vcs, base) = setup();
        let b = branch();
        let engine = CorrelationEngine::new(&vcs, &b, base);
        let head = vcs.head().unwrap();
        assert!(!engine
            .is_already_applied(&CommitId::new("0badc0ffee0badc0ffee"), &head)
            .unwrap());
    }

    #[test]
    fn test_blacklist_round_trip() {
        let (vcs, base) = setup();
        let b = branch();
        let engine = CorrelationEngine::new(&vcs, &b, base);
        let up = vcs.commit_on("upstream", "fix: noisy", "");
        assert!(!engine.is_blacklisted(&up).unwrap());
        engine.blacklist(&up, "does not apply to v5").unwrap();
        assert!(engine.is_blacklisted(&up).unwrap());
    }

    #[test]
    fn test_upstream_origin_by_subject() {
        let (vcs, base) = setup();
        let b = branch();
        let engine = CorrelationEngine::new(&vcs, &b, base);
        let up = vcs.commit_on("upstream", "fix: race", "");
        let local = vcs.commit_on("dev/stable-v5/master", "fix: race", "");
        let commit = vcs.commit(local.as_str()).unwrap();
        assert_eq!(engine.upstream_origin(&commit, "upstream").unwrap(), Some(up));

        let custom = vcs.commit_on("dev/stable-v5/master", "stable only tweak", "");
        let commit = vcs.commit(custom.as_str()).unwrap();
        assert_eq!(engine.upstream_origin(&commit, "upstream").unwrap(), None);
    }
}
