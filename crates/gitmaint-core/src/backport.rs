//! Backport execution: cherry-pick with alternates and provenance.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{CommitId, MaintainError, Result};
use crate::vcs::{LogQuery, PickOptions, VersionControl};

/// Where a backported commit came from, as recorded in its message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// Copied from an upstream commit.
    Upstream { commit: CommitId },
    /// No upstream counterpart; the operator must review it.
    Custom,
    /// Nothing new was committed.
    Unchanged,
}

impl Provenance {
    pub fn needs_review(&self) -> bool {
        matches!(self, Provenance::Custom)
    }
}

/// A successful application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applied {
    /// Commit that was actually picked (the original or an alternate).
    pub picked: CommitId,
    pub head: CommitId,
    pub provenance: Provenance,
}

/// Message carrying the provenance line after the subject.
pub fn provenance_message(subject: &str, body: &str, upstream: Option<&CommitId>) -> String {
    let line = match upstream {
        Some(id) => format!("[ Upstream commit {id} ]"),
        None => "[ Custom commit ]".to_string(),
    };
    let body = body.trim();
    if body.is_empty() {
        format!("{subject}\n\n{line}\n")
    } else {
        format!("{subject}\n\n{line}\n\n{body}\n")
    }
}

/// Applies commits to the checked-out branch.
pub struct BackportExecutor<'a> {
    vcs: &'a dyn VersionControl,
    /// Remote stable refs searched for alternates.
    stable_refs: Vec<String>,
    pick: PickOptions,
    rewrite_message: bool,
}

impl<'a> BackportExecutor<'a> {
    pub fn new(vcs: &'a dyn VersionControl, stable_refs: Vec<String>) -> Self {
        Self {
            vcs,
            stable_refs,
            pick: PickOptions::backport(),
            rewrite_message: true,
        }
    }

    /// Keep the picked message as-is (no provenance rewrite).
    pub fn without_rewrite(mut self) -> Self {
        self.rewrite_message = false;
        self
    }

    pub fn with_pick_options(mut self, pick: PickOptions) -> Self {
        self.pick = pick;
        self
    }

    /// Apply `commit` to HEAD, falling back to alternates with the same
    /// subject found on other stable lines.
    ///
    /// On failure the original pick is replayed so the conflict is left in
    /// the working tree, and [`MaintainError::Conflict`] is returned.
    pub fn apply(&self, commit: &CommitId, upstream: Option<&CommitId>) -> Result<Applied> {
        let before = self.vcs.head()?;

        if self.vcs.cherry_pick(commit, &self.pick)?.applied() {
            return self.finish(commit, &before, upstream);
        }

        if self.vcs.is_clean()? {
            warn!(commit = %commit.short(), "cherry-pick failed without changes");
        } else {
            debug!(commit = %commit.short(), "cherry-pick conflicted");
        }
        self.vcs.reset_hard(before.as_str())?;

        for alt in self.find_alternates(commit)? {
            info!(commit = %commit.short(), alternate = %alt.short(), "trying alternate");
            if self.vcs.cherry_pick(&alt, &self.pick)?.applied() {
                return self.finish(&alt, &before, upstream);
            }
            self.vcs.reset_hard(before.as_str())?;
        }

        // Leave the original conflict for the operator.
        self.vcs.cherry_pick(commit, &self.pick)?;
        Err(MaintainError::Conflict {
            commit: commit.clone(),
        })
    }

    /// Commits with exactly the same subject on any stable line.
    pub fn find_alternates(&self, commit: &CommitId) -> Result<Vec<CommitId>> {
        let refs: Vec<String> = self
            .stable_refs
            .iter()
            .filter(|r| self.vcs.resolve(r).is_some())
            .cloned()
            .collect();
        if refs.is_empty() {
            return Ok(Vec::new());
        }

        let subject = self.vcs.commit(commit.as_str())?.subject;
        let query = LogQuery {
            include: refs,
            grep: Some(subject.clone()),
            ..LogQuery::default()
        };
        let mut alternates = Vec::new();
        for id in self.vcs.log(&query)? {
            if &id == commit {
                continue;
            }
            if self.vcs.commit(id.as_str())?.subject == subject {
                alternates.push(id);
            }
        }
        Ok(alternates)
    }

    /// Record provenance on whatever HEAD holds after `before`.
    pub fn record_provenance(
        &self,
        before: &CommitId,
        upstream: Option<&CommitId>,
    ) -> Result<Provenance> {
        let head = self.vcs.head()?;
        if &head == before {
            return Ok(Provenance::Unchanged);
        }
        if !self.rewrite_message {
            return Ok(match upstream {
                Some(id) => Provenance::Upstream { commit: id.clone() },
                None => Provenance::Custom,
            });
        }

        let commit = self.vcs.commit(head.as_str())?;
        let message = provenance_message(&commit.subject, &commit.body, upstream);
        self.vcs.amend_message(&message)?;
        Ok(match upstream {
            Some(id) => Provenance::Upstream { commit: id.clone() },
            None => Provenance::Custom,
        })
    }

    fn finish(
        &self,
        picked: &CommitId,
        before: &CommitId,
        upstream: Option<&CommitId>,
    ) -> Result<Applied> {
        let provenance = self.record_provenance(before, upstream)?;
        Ok(Applied {
            picked: picked.clone(),
            head: self.vcs.head()?,
            provenance,
        })
    }
}
