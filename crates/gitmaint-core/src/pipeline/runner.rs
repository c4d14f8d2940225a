//! Branch selection, checkout and dispatch.

use std::time::Instant;

use regex::Regex;
use tracing::{info, Instrument};
use uuid::Uuid;

use super::action::{Action, Scope};
use super::{BranchOutcome, BranchReport, PushBatch, RunOptions, RunReport, WatchOptions};
use crate::domain::{Branch, BranchKind, BranchVersion, MaintainError, Result};
use crate::naming::branch_for;
use crate::obs;
use crate::operator::{Escalation, SessionExit};
use crate::registry::MaintainContext;

/// Drives one action across the selected branches.
pub struct PromotionPipeline {
    pub(super) ctx: MaintainContext,
}

/// Refspecs collected while iterating branches, pushed once at the end.
#[derive(Debug, Default)]
pub(super) struct PendingPushes {
    pub validation: Vec<String>,
    pub stable: Vec<String>,
}

impl PromotionPipeline {
    pub fn new(ctx: MaintainContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &MaintainContext {
        &self.ctx
    }

    /// Run `action`, repeating monitor actions in watch mode.
    pub async fn run(&self, action: Action, opts: &RunOptions) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id, action.name());
        self.run_inner(run_id, action, opts).instrument(span).await
    }

    async fn run_inner(&self, run_id: String, action: Action, opts: &RunOptions) -> Result<RunReport> {
        action.check_suffix(&opts.suffix, opts.delete_remote)?;
        if action == Action::Merge && opts.merge_from.is_none() {
            return Err(MaintainError::InvalidAction(
                "merge requires a source suffix".to_string(),
            ));
        }
        if action == Action::Cp && opts.commits.is_empty() {
            return Err(MaintainError::InvalidAction(
                "cp requires at least one commit".to_string(),
            ));
        }

        let started = Instant::now();
        let result = match (&opts.watch, action) {
            (Some(watch), Action::Monitor | Action::MonitorStable) => {
                self.watch(&run_id, action, opts, watch).await
            }
            _ => self.run_once(&run_id, action, opts).await,
        };
        obs::emit_run_finished(
            &run_id,
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            result.is_ok(),
        );
        result
    }

    async fn watch(
        &self,
        run_id: &str,
        action: Action,
        opts: &RunOptions,
        watch: &WatchOptions,
    ) -> Result<RunReport> {
        let mut cycles = 0u32;
        loop {
            self.ctx.ci.clear_caches();
            let report = self.run_once(run_id, action, opts).await?;
            cycles += 1;
            if watch.iterations.is_some_and(|max| cycles >= max) {
                return Ok(report);
            }
            tokio::select! {
                _ = tokio::time::sleep(watch.period) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("watch interrupted");
                    return Ok(report);
                }
            }
        }
    }

    async fn run_once(&self, run_id: &str, action: Action, opts: &RunOptions) -> Result<RunReport> {
        let spec = action.spec();
        let mut report = RunReport::new(run_id, action);

        if spec.fetch && opts.fetch {
            self.ctx.vcs.fetch(&self.ctx.config.stable_remote)?;
            if spec.fetch_validation {
                self.ctx.vcs.fetch(&self.ctx.config.validation_remote)?;
            }
        }

        if spec.scope == Scope::Global {
            obs::emit_run_started(run_id, action.name(), 0);
            report.global = Some(match action {
                Action::ListBranches => self.list_branches(opts)?,
                _ => self.submit_release(opts)?,
            });
            return Ok(report);
        }

        let branches = match spec.scope {
            Scope::AllStable => self.stable_branches(opts)?,
            _ => self.targeted_branches(opts)?,
        };
        obs::emit_run_started(run_id, action.name(), branches.len());

        let mut pending = PendingPushes::default();
        for branch in &branches {
            if spec.checkout {
                self.ctx.vcs.checkout(&branch.local).map_err(|e| MaintainError::Checkout {
                    branch: branch.local.clone(),
                    detail: e.to_string(),
                })?;
            }
            let outcome = self.dispatch(action, branch, opts, &mut pending).await?;
            info!(branch = %branch.local, ?outcome, "branch done");
            report.branches.push(BranchReport {
                branch: branch.local.clone(),
                outcome,
            });
        }

        self.flush(&mut report, pending, action, opts)?;
        Ok(report)
    }

    async fn dispatch(
        &self,
        action: Action,
        branch: &Branch,
        opts: &RunOptions,
        pending: &mut PendingPushes,
    ) -> Result<BranchOutcome> {
        match action {
            Action::Steal => self.steal(branch, opts).map(BranchOutcome::Stolen),
            Action::Cp => self.cherry_pick(branch, opts).map(BranchOutcome::Picked),
            Action::List => self.list(branch),
            Action::Merge => self.merge(branch, opts),
            Action::Pull => self.pull(branch),
            Action::Push => self.push(branch, pending),
            Action::Monitor => self.monitor(branch, opts.watch.is_some()).await,
            Action::PushStable => self.push_stable(branch, opts, pending).await,
            Action::MonitorStable => self.monitor_stable(branch).await,
            Action::Reset => self.reset(branch),
            Action::Release => self.release(branch, opts),
            Action::Create => self.create(branch),
            Action::Delete => self.delete(branch, opts, pending),
            Action::ListBranches | Action::SubmitRelease => Err(MaintainError::InvalidAction(
                format!("{action} is not a per-branch action"),
            )),
        }
    }

    fn flush(
        &self,
        report: &mut RunReport,
        pending: PendingPushes,
        action: Action,
        opts: &RunOptions,
    ) -> Result<()> {
        let force = opts.force && action == Action::Push;
        let batches = [
            (&self.ctx.config.validation_remote, pending.validation),
            (&self.ctx.config.stable_remote, pending.stable),
        ];
        for (remote, refspecs) in batches {
            if refspecs.is_empty() {
                continue;
            }
            self.ctx.vcs.push(remote, &refspecs, force)?;
            obs::emit_push_batch(remote, refspecs.len(), force);
            report.pushes.push(PushBatch {
                remote: remote.clone(),
                refspecs,
                force,
            });
        }
        Ok(())
    }

    /// Local branches matching the targeting options, oldest version first.
    pub fn targeted_branches(&self, opts: &RunOptions) -> Result<Vec<Branch>> {
        let naming = self.ctx.naming.as_ref();
        let config = &self.ctx.config;

        if let Some(name) = &opts.branch {
            let version = naming
                .suffix_of(name)
                .and_then(|suffix| naming.parse_local(name, &suffix))
                .unwrap_or_else(|| BranchVersion::new(name.clone()));
            let mut branch = branch_for(naming, config, version, &opts.suffix, BranchKind::UserSpecified);
            branch.local = name.clone();
            return Ok(vec![branch]);
        }

        let filter = opts
            .version_filter
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| MaintainError::Config(format!("invalid version filter: {e}")))?;

        let mut versions: Vec<BranchVersion> = self
            .ctx
            .vcs
            .local_branches()?
            .iter()
            .filter_map(|name| naming.parse_local(name, &opts.suffix))
            .collect();
        versions.sort();
        versions.dedup();

        Ok(versions
            .into_iter()
            .filter(|v| self.wanted(v, opts, filter.as_ref()))
            .map(|v| branch_for(naming, config, v, &opts.suffix, BranchKind::Standard))
            .collect())
    }

    /// Every branch published on the stable remote.
    pub fn stable_branches(&self, opts: &RunOptions) -> Result<Vec<Branch>> {
        let naming = self.ctx.naming.as_ref();
        let mut versions: Vec<BranchVersion> = self
            .ctx
            .vcs
            .remote_branches(&self.ctx.config.stable_remote)?
            .iter()
            .filter_map(|name| naming.parse_stable(name))
            .collect();
        versions.sort();
        versions.dedup();
        Ok(versions
            .into_iter()
            .map(|v| branch_for(naming, &self.ctx.config, v, &opts.suffix, BranchKind::Standard))
            .collect())
    }

    fn wanted(&self, version: &BranchVersion, opts: &RunOptions, filter: Option<&Regex>) -> bool {
        if let (Some(min), Some(major)) = (opts.base_version, version.major()) {
            if major < min {
                info!("Skipping older v{version}");
                return false;
            }
        }
        if let Some(re) = filter {
            if !re.is_match(version.as_str()) {
                info!("Skipping v{version}: does not match version filter");
                return false;
            }
        }
        true
    }

    /// Hand the working tree to the operator; an aborted session cancels
    /// the run.
    pub(super) fn escalate(&self, escalation: Escalation) -> Result<()> {
        obs::emit_escalation(
            &escalation.branch,
            &escalation.escalation_id,
            escalation.reason.kind(),
        );
        match self.ctx.operator.escalate(&escalation)? {
            SessionExit::Resume => Ok(()),
            SessionExit::Abort => Err(MaintainError::Cancelled),
        }
    }

    /// Escalate and require a clean tree afterwards.
    pub(super) fn escalate_until_clean(&self, escalation: Escalation) -> Result<()> {
        self.escalate(escalation)?;
        if !self.ctx.vcs.is_clean()? {
            return Err(MaintainError::Cancelled);
        }
        Ok(())
    }
}
