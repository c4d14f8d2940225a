//! Promotion and housekeeping actions.

use std::collections::BTreeSet;

use tracing::{info, warn};

use super::runner::{PendingPushes, PromotionPipeline};
use super::{BranchOutcome, GlobalOutcome, PromotionState, RunOptions};
use crate::domain::{Branch, CiError, CiTarget, CommitId, MaintainError, Result};
use crate::operator::{Escalation, EscalationReason};
use crate::vcs::LogQuery;

impl PromotionPipeline {
    /// Where `branch` stands in the promotion flow.
    pub async fn promotion_state(&self, branch: &Branch) -> Result<PromotionState> {
        let vcs = self.ctx.vcs.as_ref();
        let Some(head) = vcs.resolve(&branch.local) else {
            return Ok(PromotionState::Local);
        };

        if vcs.resolve(&branch.stable_ref()).as_ref() == Some(&head) {
            let released = vcs
                .tags("v*", Some(&branch.local))?
                .iter()
                .any(|tag| vcs.resolve(tag).as_ref() == Some(&head));
            return Ok(if released {
                PromotionState::Released
            } else {
                PromotionState::StablePushed
            });
        }

        if vcs.resolve(&branch.validation_ref()).as_ref() == Some(&head) {
            return match self.ctx.ci.state(CiTarget::Validation, branch, &head).await {
                Ok(build) if build.passed() => Ok(PromotionState::CiPassed),
                Ok(_) | Err(CiError::NoProvider(_)) => Ok(PromotionState::ValidationPushed),
                Err(e) => Err(e.into()),
            };
        }
        Ok(PromotionState::Local)
    }

    /// `<short-id> <subject>` for every commit in `from..to`.
    fn headlines(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let vcs = self.ctx.vcs.as_ref();
        vcs.log(&LogQuery::range(from, to))?
            .into_iter()
            .map(|id| {
                vcs.commit(id.as_str())
                    .map(|c| c.headline())
                    .map_err(MaintainError::from)
            })
            .collect()
    }

    fn local_head(&self, branch: &Branch) -> Result<CommitId> {
        self.ctx
            .vcs
            .resolve(&branch.local)
            .ok_or_else(|| MaintainError::Config(format!("branch {} does not exist", branch.local)))
    }

    pub(super) fn push(&self, branch: &Branch, pending: &mut PendingPushes) -> Result<BranchOutcome> {
        let vcs = self.ctx.vcs.as_ref();
        let head = self.local_head(branch)?;
        let published = [branch.validation_ref(), branch.stable_ref()]
            .iter()
            .any(|r| vcs.resolve(r).as_ref() == Some(&head));
        if published {
            info!(branch = %branch.local, "nothing to push");
            return Ok(BranchOutcome::NothingToPush);
        }
        pending.validation.push(branch.local.clone());
        Ok(BranchOutcome::Queued {
            refspec: branch.local.clone(),
        })
    }

    /// Report and skip when the repository has no CI integration.
    fn ci_disabled(&self, branch: &Branch) -> Option<BranchOutcome> {
        if self.ctx.ci.is_enabled() {
            return None;
        }
        self.ctx
            .operator
            .report(&format!("Status for {}: CI disabled", branch.label()));
        Some(BranchOutcome::Skipped {
            reason: "CI disabled".to_string(),
        })
    }

    pub(super) async fn monitor(&self, branch: &Branch, watching: bool) -> Result<BranchOutcome> {
        if let Some(outcome) = self.ci_disabled(branch) {
            return Ok(outcome);
        }
        let head = self.local_head(branch)?;
        let build = self.ctx.ci.state(CiTarget::Validation, branch, &head).await?;
        let state = self.promotion_state(branch).await?;

        let mut line = format!("Status for {}: {}", branch.label(), build.raw_state);
        if let Some(ts) = build.started_at {
            line.push_str(&format!(" (started {})", ts.format("%Y-%m-%d %H:%M:%S UTC")));
        }
        self.ctx.operator.report(&line);

        if !watching && self.ctx.ci.is_errored(branch, &build) {
            let mut question = "Do you want to see the build log";
            while self.ctx.operator.confirm(question) {
                let log = self.ctx.ci.log(CiTarget::Validation, branch, &head).await?;
                self.ctx.operator.show_log(&log)?;
                question = "Do you want to see the build log again";
            }
        }

        Ok(BranchOutcome::CiState {
            build,
            state: Some(state),
        })
    }

    pub(super) async fn monitor_stable(&self, branch: &Branch) -> Result<BranchOutcome> {
        if let Some(outcome) = self.ci_disabled(branch) {
            return Ok(outcome);
        }
        let Some(head) = self.ctx.vcs.resolve(&branch.stable_ref()) else {
            return Ok(BranchOutcome::Skipped {
                reason: format!("{} does not exist", branch.stable_ref()),
            });
        };
        let build = self.ctx.ci.state(CiTarget::Stable, branch, &head).await?;
        self.ctx.operator.report(&format!(
            "Stable status for {}: {}",
            branch.label(),
            build.raw_state
        ));
        Ok(BranchOutcome::CiState { build, state: None })
    }

    pub(super) async fn push_stable(
        &self,
        branch: &Branch,
        opts: &RunOptions,
        pending: &mut PendingPushes,
    ) -> Result<BranchOutcome> {
        let vcs = self.ctx.vcs.as_ref();
        let head = self.local_head(branch)?;
        let stable_ref = branch.stable_ref();
        if vcs.resolve(&stable_ref).as_ref() == Some(&head) {
            info!(branch = %branch.local, "stable branch already up to date");
            return Ok(BranchOutcome::NothingToPush);
        }

        if !self.ctx.ci.is_enabled() {
            info!(branch = %branch.local, "CI disabled, not gating on build state");
        } else if !opts.skip_ci_check {
            let state = self.promotion_state(branch).await?;
            if state < PromotionState::CiPassed {
                warn!(branch = %branch.local, ?state, "build is not passed on CI, skipping");
                return Ok(BranchOutcome::Skipped {
                    reason: format!("build is not passed on CI ({state:?})"),
                });
            }
        }

        let lines = if vcs.resolve(&stable_ref).is_some() {
            self.headlines(&stable_ref, &branch.local)?
        } else {
            Vec::new()
        };
        self.ctx
            .operator
            .show_range(&format!("Commits to publish on {stable_ref}"), &lines);
        if !self.ctx.operator.confirm(&format!(
            "Do you want to push {} to {}",
            branch.label(),
            stable_ref
        )) {
            return Ok(BranchOutcome::Declined);
        }

        let refspec = format!("{}:{}", branch.local, branch.stable_branch);
        pending.stable.push(refspec.clone());
        Ok(BranchOutcome::Queued { refspec })
    }

    pub(super) fn reset(&self, branch: &Branch) -> Result<BranchOutcome> {
        let vcs = self.ctx.vcs.as_ref();
        let stable_ref = branch.stable_ref();
        let Some(stable) = vcs.resolve(&stable_ref) else {
            return Ok(BranchOutcome::Skipped {
                reason: format!("{stable_ref} does not exist"),
            });
        };
        if vcs.head()? == stable {
            return Ok(BranchOutcome::UpToDate);
        }

        let dropped = self.headlines(&stable_ref, &branch.local)?;
        self.ctx
            .operator
            .show_range(&format!("Commits dropped by resetting to {stable_ref}"), &dropped);
        if !self
            .ctx
            .operator
            .confirm(&format!("Reset {} to {stable_ref}", branch.local))
        {
            return Ok(BranchOutcome::Declined);
        }
        vcs.reset_hard(&stable_ref)?;
        Ok(BranchOutcome::Reset)
    }

    pub(super) fn create(&self, branch: &Branch) -> Result<BranchOutcome> {
        let vcs = self.ctx.vcs.as_ref();
        if vcs.local_branches()?.contains(&branch.local) {
            return Ok(BranchOutcome::AlreadyExists);
        }
        vcs.create_branch(&branch.local, &branch.stable_ref())?;
        info!(branch = %branch.local, from = %branch.stable_ref(), "created");
        Ok(BranchOutcome::Created)
    }

    pub(super) fn delete(
        &self,
        branch: &Branch,
        opts: &RunOptions,
        pending: &mut PendingPushes,
    ) -> Result<BranchOutcome> {
        let vcs = self.ctx.vcs.as_ref();
        if opts.delete_remote {
            if vcs.resolve(&branch.validation_ref()).is_none() {
                return Ok(BranchOutcome::Skipped {
                    reason: format!("{} does not exist", branch.validation_ref()),
                });
            }
            if !self.ctx.operator.confirm(&format!(
                "Delete {} from {}",
                branch.local, branch.validation_remote
            )) {
                return Ok(BranchOutcome::Declined);
            }
            pending.validation.push(format!(":{}", branch.local));
            return Ok(BranchOutcome::Deleted);
        }

        if !self
            .ctx
            .operator
            .confirm(&format!("Delete local branch {}", branch.local))
        {
            return Ok(BranchOutcome::Declined);
        }
        vcs.delete_branch(&branch.local)?;
        Ok(BranchOutcome::Deleted)
    }

    pub(super) fn merge(&self, branch: &Branch, opts: &RunOptions) -> Result<BranchOutcome> {
        let vcs = self.ctx.vcs.as_ref();
        let Some(from) = opts.merge_from.as_deref() else {
            return Err(MaintainError::InvalidAction(
                "merge requires a source suffix".to_string(),
            ));
        };
        let source = self.ctx.naming.local_branch(&branch.version, from);
        if vcs.resolve(&source).is_none() {
            info!(branch = %branch.local, source = %source, "no merge source, skipping");
            return Ok(BranchOutcome::Skipped {
                reason: format!("{source} does not exist"),
            });
        }

        let lines = self.headlines(&branch.local, &source)?;
        if lines.is_empty() {
            return Ok(BranchOutcome::UpToDate);
        }
        self.ctx
            .operator
            .show_range(&format!("Commits merged from {source}"), &lines);
        if !self
            .ctx
            .operator
            .confirm(&format!("Merge {source} into {}", branch.local))
        {
            return Ok(BranchOutcome::Declined);
        }

        if !vcs.merge(&source)?.applied() {
            self.escalate_until_clean(Escalation::new(
                &branch.local,
                EscalationReason::MergeFailed { source },
            ))?;
        }
        Ok(BranchOutcome::Merged)
    }

    pub(super) fn pull(&self, branch: &Branch) -> Result<BranchOutcome> {
        let vcs = self.ctx.vcs.as_ref();
        let stable_ref = branch.stable_ref();
        let Some(stable) = vcs.resolve(&stable_ref) else {
            return Ok(BranchOutcome::Skipped {
                reason: format!("{stable_ref} does not exist"),
            });
        };
        if vcs.is_ancestor(&stable, &vcs.head()?)? {
            return Ok(BranchOutcome::UpToDate);
        }
        if !vcs.rebase(&stable_ref)?.applied() {
            self.escalate_until_clean(Escalation::new(
                &branch.local,
                EscalationReason::RebaseFailed { onto: stable_ref },
            ))?;
        }
        Ok(BranchOutcome::Pulled)
    }

    pub(super) fn list(&self, branch: &Branch) -> Result<BranchOutcome> {
        let stable_ref = branch.stable_ref();
        if self.ctx.vcs.resolve(&stable_ref).is_none() {
            return Ok(BranchOutcome::Skipped {
                reason: format!("{stable_ref} does not exist"),
            });
        }
        let lines = self.headlines(&stable_ref, &branch.local)?;
        self.ctx.operator.show_range(
            &format!("{} commits not yet in {stable_ref}", branch.label()),
            &lines,
        );
        Ok(BranchOutcome::Listed {
            commits: lines.len(),
        })
    }

    pub(super) fn release(&self, branch: &Branch, opts: &RunOptions) -> Result<BranchOutcome> {
        let vcs = self.ctx.vcs.as_ref();
        let plan = self.ctx.release.plan(vcs, branch, &opts.release)?;
        self.ctx.operator.show_range(
            &format!("Changes since {}", plan.previous_tag),
            &plan.changes,
        );
        if !self.ctx.operator.confirm(&format!(
            "Release {} as {}",
            branch.label(),
            plan.tag
        )) {
            return Ok(BranchOutcome::Declined);
        }
        self.ctx.release.publish(vcs, &plan)?;
        info!(branch = %branch.local, tag = %plan.tag, "released");
        Ok(BranchOutcome::Released { tag: plan.tag })
    }

    pub(super) fn list_branches(&self, opts: &RunOptions) -> Result<GlobalOutcome> {
        let versions: Vec<String> = self
            .targeted_branches(opts)?
            .into_iter()
            .map(|b| b.version.to_string())
            .collect();
        for version in &versions {
            self.ctx.operator.report(version);
        }
        Ok(GlobalOutcome::Branches { versions })
    }

    pub(super) fn submit_release(&self, _opts: &RunOptions) -> Result<GlobalOutcome> {
        let vcs = self.ctx.vcs.as_ref();
        let remote = &self.ctx.config.stable_remote;
        let published: BTreeSet<String> = vcs.remote_tags(remote)?.into_iter().collect();
        let missing: Vec<String> = vcs
            .tags("v*", None)?
            .into_iter()
            .filter(|t| !published.contains(t))
            .collect();

        if missing.is_empty() {
            self.ctx.operator.report("All tags are already submitted");
            return Ok(GlobalOutcome::NothingToSubmit);
        }

        self.ctx
            .operator
            .show_range(&format!("Tags missing on {remote}"), &missing);
        if !self.ctx.operator.confirm("Do you want to release them")
            || !self
                .ctx
                .operator
                .confirm(&format!("Are you sure you want to submit these releases to {remote}"))
        {
            return Err(MaintainError::Cancelled);
        }

        let refspecs: Vec<String> = missing.iter().map(|t| format!("refs/tags/{t}")).collect();
        vcs.push(remote, &refspecs, false)?;
        crate::obs::emit_push_batch(remote, refspecs.len(), false);
        Ok(GlobalOutcome::Submitted { tags: missing })
    }
}
