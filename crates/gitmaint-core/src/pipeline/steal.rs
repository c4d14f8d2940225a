//! `steal` and `cp`: selecting and applying commits on one branch.

use tracing::{debug, info, warn};

use super::runner::PromotionPipeline;
use super::{CommitOutcome, RunOptions, StealReport};
use crate::backport::{Applied, BackportExecutor};
use crate::checkpoint::{CheckpointStore, StartMode};
use crate::correlation::CorrelationEngine;
use crate::domain::{Branch, CommitId, MaintainError, Result};
use crate::obs;
use crate::operator::{Escalation, EscalationReason};
use crate::vcs::LogQuery;

impl PromotionPipeline {
    /// Backport every relevant upstream commit since the start point.
    pub(super) fn steal(&self, branch: &Branch, opts: &RunOptions) -> Result<StealReport> {
        let vcs = self.ctx.vcs.as_ref();
        let (base_name, base) = self.stable_base(branch)?;
        let upstream_tip = vcs.resolve(&self.ctx.config.upstream_ref).ok_or_else(|| {
            MaintainError::Config(format!(
                "could not resolve upstream ref {}",
                self.ctx.config.upstream_ref
            ))
        })?;

        let store = CheckpointStore::new(vcs);
        let start = store.resolve_start_point(&base_name, &opts.start)?;
        let range = vcs.log(
            &LogQuery::range(start.commit.as_str(), upstream_tip.as_str())
                .no_merges()
                .oldest_first(),
        )?;
        info!(
            branch = %branch.local,
            start = %start.commit.short(),
            from_checkpoint = start.from_checkpoint,
            commits = range.len(),
            "stealing"
        );

        let correlation = CorrelationEngine::new(vcs, branch, base);
        let executor = BackportExecutor::new(vcs, self.stable_refs()?);
        let covered = match opts.start {
            StartMode::Explicit(_) => store.covers(&base_name, &start.commit)?,
            StartMode::Default | StartMode::All => true,
        };
        let mut report = StealReport {
            start: Some(start.commit),
            end: Some(upstream_tip.clone()),
            ..StealReport::default()
        };

        for id in range {
            let outcome = self.steal_one(branch, &correlation, &executor, &id)?;
            obs::emit_commit_outcome(&branch.local, id.short(), outcome.label());
            report.outcomes.push((id, outcome));
        }

        if !covered {
            obs::emit_checkpoint_held(&base_name, "explicit start skips unprocessed commits");
        } else if report.is_complete() {
            report.checkpoint_advanced = store.advance(&base_name, &upstream_tip)?;
            if report.checkpoint_advanced {
                obs::emit_checkpoint_advanced(&base_name, upstream_tip.short());
            }
        } else {
            obs::emit_checkpoint_held(&base_name, "operator intervention during run");
        }
        Ok(report)
    }

    fn steal_one(
        &self,
        branch: &Branch,
        correlation: &CorrelationEngine<'_>,
        executor: &BackportExecutor<'_>,
        id: &CommitId,
    ) -> Result<CommitOutcome> {
        let vcs = self.ctx.vcs.as_ref();
        let commit = vcs.commit(id.as_str())?;

        if !correlation.is_relevant(&commit)? {
            return Ok(CommitOutcome::Irrelevant);
        }
        if correlation.is_already_applied(id, &vcs.head()?)? {
            debug!(commit = %id.short(), "already in tree");
            return Ok(CommitOutcome::AlreadyApplied);
        }
        if correlation.is_blacklisted(id)? {
            debug!(commit = %id.short(), "blacklisted");
            return Ok(CommitOutcome::Blacklisted);
        }

        info!(commit = %id.short(), subject = %commit.subject, "backporting");
        self.apply(branch, correlation, executor, id, Some(id))
    }

    /// Backport the operator-supplied commits, bypassing relevance.
    pub(super) fn cherry_pick(&self, branch: &Branch, opts: &RunOptions) -> Result<StealReport> {
        let vcs = self.ctx.vcs.as_ref();
        let (_, base) = self.stable_base(branch)?;
        let correlation = CorrelationEngine::new(vcs, branch, base);
        let mut executor = BackportExecutor::new(vcs, self.stable_refs()?);
        if opts.no_edit {
            executor = executor.without_rewrite();
        }

        let mut report = StealReport::default();
        for rev in &opts.commits {
            let id = vcs.resolve(rev).ok_or_else(|| {
                MaintainError::Config(format!("unknown commit {rev}"))
            })?;
            let commit = vcs.commit(id.as_str())?;

            let outcome = if correlation.is_already_applied(&id, &vcs.head()?)? {
                CommitOutcome::AlreadyApplied
            } else {
                let upstream = correlation.upstream_origin(&commit, &self.ctx.config.upstream_ref)?;
                if upstream.is_none() {
                    warn!(commit = %id.short(), subject = %commit.subject, "no upstream commit found, marking as custom");
                }
                self.apply(branch, &correlation, &executor, &id, upstream.as_ref())?
            };
            obs::emit_commit_outcome(&branch.local, id.short(), outcome.label());
            report.outcomes.push((id, outcome));
        }
        Ok(report)
    }

    /// Apply one commit, escalating conflicts and custom commits.
    fn apply(
        &self,
        branch: &Branch,
        correlation: &CorrelationEngine<'_>,
        executor: &BackportExecutor<'_>,
        id: &CommitId,
        upstream: Option<&CommitId>,
    ) -> Result<CommitOutcome> {
        let before = self.ctx.vcs.head()?;
        match executor.apply(id, upstream) {
            Ok(Applied {
                head, provenance, ..
            }) => {
                if provenance.needs_review() {
                    self.escalate_until_clean(Escalation::new(
                        &branch.local,
                        EscalationReason::CustomCommit { commit: id.clone() },
                    ))?;
                }
                Ok(CommitOutcome::Applied { head, provenance })
            }
            Err(MaintainError::Conflict { commit }) => {
                self.resolve_conflict(branch, correlation, executor, &commit, &before, upstream)
            }
            Err(e) => Err(e),
        }
    }

    /// Hand a conflicted pick to the operator and classify the result.
    fn resolve_conflict(
        &self,
        branch: &Branch,
        correlation: &CorrelationEngine<'_>,
        executor: &BackportExecutor<'_>,
        commit: &CommitId,
        before: &CommitId,
        upstream: Option<&CommitId>,
    ) -> Result<CommitOutcome> {
        self.escalate_until_clean(Escalation::new(
            &branch.local,
            EscalationReason::Conflict {
                commit: commit.clone(),
            },
        ))?;

        let head = self.ctx.vcs.head()?;
        if &head != before {
            let provenance = executor.record_provenance(before, upstream)?;
            if provenance.needs_review() {
                self.escalate_until_clean(Escalation::new(
                    &branch.local,
                    EscalationReason::CustomCommit {
                        commit: commit.clone(),
                    },
                ))?;
            }
            return Ok(CommitOutcome::Resolved {
                head: self.ctx.vcs.head()?,
            });
        }

        let question = format!(
            "Blacklist commit {} for branch {}",
            commit.short(),
            branch.local
        );
        let blacklisted = self.ctx.operator.confirm(&question);
        if blacklisted {
            correlation.blacklist(commit, "skipped after a failed backport")?;
        }
        Ok(CommitOutcome::Dropped { blacklisted })
    }

    /// Name and id of the branch's stable base.
    pub(super) fn stable_base(&self, branch: &Branch) -> Result<(String, CommitId)> {
        let name = self.ctx.naming.stable_base(&branch.local)?;
        let id = self.ctx.vcs.resolve(&name).ok_or_else(|| {
            MaintainError::Config(format!(
                "could not resolve stable base {name} of {}",
                branch.local
            ))
        })?;
        Ok((name, id))
    }

    /// Remote-tracking refs of every published stable branch.
    pub(super) fn stable_refs(&self) -> Result<Vec<String>> {
        let remote = &self.ctx.config.stable_remote;
        Ok(self
            .ctx
            .vcs
            .remote_branches(remote)?
            .into_iter()
            .filter(|name| self.ctx.naming.parse_stable(name).is_some())
            .map(|name| format!("{remote}/{name}"))
            .collect())
    }
}
