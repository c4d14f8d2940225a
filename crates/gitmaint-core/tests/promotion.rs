//! Promotion and housekeeping actions against the in-memory repository
//! and a scripted CI backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gitmaint_core::{
    Action, Branch, BranchOutcome, CiBuild, CiError, CiProvider, CiRouter, CiTarget, CommitId,
    GlobalOutcome, MaintainContext, MaintainError, MemoryVcs, PromotionPipeline, PromotionState,
    ReleaseKind, RepoConfig, RunOptions, ScriptedOperator, StrategyRegistry, VersionControl,
    WatchOptions,
};

const V5: &str = "dev/stable-v5/master";
const V6: &str = "dev/stable-v6/master";

#[derive(Default)]
struct FakeCi {
    builds: Mutex<HashMap<(CiTarget, CommitId), CiBuild>>,
    clears: AtomicUsize,
}

impl FakeCi {
    fn set(&self, target: CiTarget, commit: &CommitId, state: &str) {
        self.builds
            .lock()
            .unwrap()
            .insert((target, commit.clone()), CiBuild::new(state, None));
    }
}

#[async_trait]
impl CiProvider for FakeCi {
    fn name(&self) -> &str {
        "fake"
    }

    async fn build(
        &self,
        target: CiTarget,
        _branch: &Branch,
        commit: &CommitId,
    ) -> Result<CiBuild, CiError> {
        Ok(self
            .builds
            .lock()
            .unwrap()
            .get(&(target, commit.clone()))
            .cloned()
            .unwrap_or_else(CiBuild::not_found))
    }

    async fn log(
        &self,
        _target: CiTarget,
        branch: &Branch,
        _commit: &CommitId,
    ) -> Result<String, CiError> {
        Ok(format!("log of {}", branch.local))
    }

    fn is_errored(&self, build: &CiBuild) -> bool {
        matches!(build.raw_state.as_str(), "failed" | "errored")
    }

    fn clear_cache(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

/// v5 and v6 lines, both published on the stable remote.
fn repo() -> Arc<MemoryVcs> {
    let vcs = Arc::new(MemoryVcs::new("rdma-core"));
    let base5 = vcs.commit_on("master", "release 5", "");
    vcs.tag("v5", base5.as_str());
    let base6 = vcs.commit_on("master", "release 6", "");
    vcs.tag("v6", base6.as_str());

    vcs.set_branch(V5, "v5");
    vcs.set_branch(V6, "v6");
    vcs.set_remote_ref("stable", "stable-v5", "v5");
    vcs.set_remote_ref("stable", "stable-v6", "v6");
    vcs
}

fn pipeline(vcs: &Arc<MemoryVcs>, ci: CiRouter, operator: Arc<ScriptedOperator>) -> PromotionPipeline {
    let config = RepoConfig::load(vcs.as_ref()).unwrap();
    let strategies = StrategyRegistry::new().resolve(&config).unwrap();
    PromotionPipeline::new(MaintainContext::new(
        vcs.clone(),
        config,
        strategies,
        ci,
        operator,
    ))
}

/// Put a fix on the local branch and publish it to the validation remote.
fn validate(vcs: &MemoryVcs, local: &str, subject: &str) -> CommitId {
    let id = vcs.commit_on(local, subject, "");
    vcs.set_remote_ref("github", local, local);
    id
}

#[tokio::test]
async fn push_batches_branches_into_one_invocation() {
    let vcs = repo();
    vcs.commit_on(V5, "fix a", "");
    vcs.commit_on(V6, "fix b", "");
    let p = pipeline(&vcs, CiRouter::disabled(), Arc::new(ScriptedOperator::new(true)));

    let report = p.run(Action::Push, &RunOptions::default()).await.unwrap();
    assert_eq!(report.pushes.len(), 1);
    assert_eq!(report.pushes[0].remote, "github");
    assert_eq!(report.pushes[0].refspecs, vec![V5.to_string(), V6.to_string()]);
    assert!(!report.pushes[0].force);
    assert_eq!(vcs.pushes().len(), 1);
    assert_eq!(vcs.fetches(), vec!["stable".to_string(), "github".to_string()]);
}

#[tokio::test]
async fn push_skips_published_heads() {
    let vcs = repo();
    validate(&vcs, V5, "fix a");
    let p = pipeline(&vcs, CiRouter::disabled(), Arc::new(ScriptedOperator::new(true)));

    let opts = RunOptions {
        force: true,
        ..RunOptions::default()
    };
    let report = p.run(Action::Push, &opts).await.unwrap();
    assert_eq!(report.outcome(V5), Some(&BranchOutcome::NothingToPush));
    // v6 equals its stable branch.
    assert_eq!(report.outcome(V6), Some(&BranchOutcome::NothingToPush));
    assert!(report.pushes.is_empty());
    assert!(vcs.pushes().is_empty());
}

#[tokio::test]
async fn push_stable_requires_passed_ci() {
    let vcs = repo();
    let ci = Arc::new(FakeCi::default());
    let a = validate(&vcs, V5, "fix a");
    let b = validate(&vcs, V6, "fix b");
    ci.set(CiTarget::Validation, &a, "passed");
    ci.set(CiTarget::Validation, &b, "failed");
    let operator = Arc::new(ScriptedOperator::new(true));
    let p = pipeline(&vcs, CiRouter::new(ci), operator.clone());

    let report = p.run(Action::PushStable, &RunOptions::default()).await.unwrap();
    assert_eq!(
        report.outcome(V5),
        Some(&BranchOutcome::Queued {
            refspec: format!("{V5}:stable-v5")
        })
    );
    assert!(matches!(report.outcome(V6), Some(BranchOutcome::Skipped { .. })));

    let pushes = vcs.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].remote, "stable");
    assert_eq!(vcs.resolve("stable/stable-v5"), Some(a));
    assert!(operator
        .transcript()
        .contains(&"# Commits to publish on stable/stable-v5 (1)".to_string()));
}

#[tokio::test]
async fn push_stable_without_ci_check() {
    let vcs = repo();
    vcs.commit_on(V5, "fix a", "");
    let p = pipeline(&vcs, CiRouter::disabled(), Arc::new(ScriptedOperator::new(true)));

    let opts = RunOptions {
        skip_ci_check: true,
        version_filter: Some("^5$".to_string()),
        ..RunOptions::default()
    };
    let report = p.run(Action::PushStable, &opts).await.unwrap();
    assert!(matches!(report.outcome(V5), Some(BranchOutcome::Queued { .. })));
    assert_eq!(report.branches.len(), 1);
    assert_eq!(vcs.resolve("stable/stable-v5"), vcs.resolve(V5));
}

#[tokio::test]
async fn push_stable_declined_pushes_nothing() {
    let vcs = repo();
    vcs.commit_on(V5, "fix a", "");
    let p = pipeline(&vcs, CiRouter::disabled(), Arc::new(ScriptedOperator::new(false)));

    let opts = RunOptions {
        skip_ci_check: true,
        ..RunOptions::default()
    };
    let report = p.run(Action::PushStable, &opts).await.unwrap();
    assert_eq!(report.outcome(V5), Some(&BranchOutcome::Declined));
    assert_eq!(report.outcome(V6), Some(&BranchOutcome::NothingToPush));
    assert!(vcs.pushes().is_empty());
}

#[tokio::test]
async fn primary_only_actions_reject_other_suffixes() {
    let vcs = repo();
    let p = pipeline(&vcs, CiRouter::disabled(), Arc::new(ScriptedOperator::new(true)));
    let opts = RunOptions {
        suffix: "rc".to_string(),
        ..RunOptions::default()
    };
    for action in [Action::PushStable, Action::Release, Action::SubmitRelease] {
        let err = p.run(action, &opts).await.unwrap_err();
        assert!(matches!(err, MaintainError::InvalidSuffix { .. }), "{action}");
    }
    assert!(vcs.fetches().is_empty());
}

#[tokio::test]
async fn promotion_state_follows_the_branch() {
    let vcs = repo();
    let ci = Arc::new(FakeCi::default());
    let p = pipeline(&vcs, CiRouter::new(ci.clone()), Arc::new(ScriptedOperator::new(true)));
    let branches = p.targeted_branches(&RunOptions::default()).unwrap();
    let v5 = &branches[0];

    // The base tag sits on the published head.
    assert_eq!(p.promotion_state(v5).await.unwrap(), PromotionState::Released);
    vcs.commit_on(V5, "fix a", "");
    assert_eq!(p.promotion_state(v5).await.unwrap(), PromotionState::Local);
    vcs.set_remote_ref("github", V5, V5);
    assert_eq!(p.promotion_state(v5).await.unwrap(), PromotionState::ValidationPushed);
    ci.set(CiTarget::Validation, &vcs.resolve(V5).unwrap(), "passed");
    assert_eq!(p.promotion_state(v5).await.unwrap(), PromotionState::CiPassed);
    vcs.set_remote_ref("stable", "stable-v5", V5);
    assert_eq!(p.promotion_state(v5).await.unwrap(), PromotionState::StablePushed);
    vcs.tag("v5.1", V5);
    assert_eq!(p.promotion_state(v5).await.unwrap(), PromotionState::Released);
}

#[tokio::test]
async fn monitor_offers_the_log_of_errored_builds() {
    let vcs = repo();
    let ci = Arc::new(FakeCi::default());
    let a = validate(&vcs, V5, "fix a");
    ci.set(CiTarget::Validation, &a, "errored");
    let operator = Arc::new(ScriptedOperator::new(false).with_answers([true, true, false]));
    let p = pipeline(&vcs, CiRouter::new(ci), operator.clone());

    let opts = RunOptions {
        version_filter: Some("^5$".to_string()),
        ..RunOptions::default()
    };
    let report = p.run(Action::Monitor, &opts).await.unwrap();
    assert!(matches!(
        report.outcome(V5),
        Some(BranchOutcome::CiState { state: Some(PromotionState::ValidationPushed), .. })
    ));
    assert_eq!(
        operator.transcript(),
        vec![
            "Status for v5: errored".to_string(),
            "? Do you want to see the build log".to_string(),
            format!("log: {} bytes", format!("log of {V5}").len()),
            "? Do you want to see the build log again".to_string(),
            format!("log: {} bytes", format!("log of {V5}").len()),
            "? Do you want to see the build log again".to_string(),
        ]
    );
}

#[tokio::test]
async fn monitor_without_ci_reports_disabled() {
    let vcs = repo();
    let operator = Arc::new(ScriptedOperator::new(true));
    let p = pipeline(&vcs, CiRouter::disabled(), operator.clone());

    let report = p.run(Action::Monitor, &RunOptions::default()).await.unwrap();
    let disabled = BranchOutcome::Skipped {
        reason: "CI disabled".to_string(),
    };
    assert_eq!(report.outcome(V5), Some(&disabled));
    assert_eq!(report.outcome(V6), Some(&disabled));
    assert!(operator
        .transcript()
        .contains(&"Status for v5: CI disabled".to_string()));

    let report = p.run(Action::MonitorStable, &RunOptions::default()).await.unwrap();
    assert_eq!(report.outcome(V5), Some(&disabled));
}

#[tokio::test]
async fn push_stable_is_not_gated_for_repositories_without_ci() {
    let vcs = Arc::new(MemoryVcs::new("hpc-testing"));
    let base = vcs.commit_on("master", "release 5", "");
    vcs.tag("v5", base.as_str());
    vcs.set_branch(V5, "v5");
    vcs.set_remote_ref("stable", "stable-v5", "v5");
    let fix = validate(&vcs, V5, "fix a");

    let config = RepoConfig::load(vcs.as_ref()).unwrap();
    let strategies = StrategyRegistry::builtin().resolve(&config).unwrap();
    assert_eq!(strategies.ci_routing.backend, "none");
    let p = PromotionPipeline::new(MaintainContext::new(
        vcs.clone(),
        config,
        strategies,
        CiRouter::disabled(),
        Arc::new(ScriptedOperator::new(true)),
    ));

    let report = p.run(Action::PushStable, &RunOptions::default()).await.unwrap();
    assert_eq!(
        report.outcome(V5),
        Some(&BranchOutcome::Queued {
            refspec: format!("{V5}:stable-v5")
        })
    );
    assert_eq!(vcs.resolve("stable/stable-v5"), Some(fix));
}

#[tokio::test]
async fn watch_refreshes_ci_every_cycle() {
    let vcs = repo();
    let ci = Arc::new(FakeCi::default());
    let a = validate(&vcs, V5, "fix a");
    ci.set(CiTarget::Validation, &a, "failed");
    let operator = Arc::new(ScriptedOperator::new(true));
    let p = pipeline(&vcs, CiRouter::new(ci.clone()), operator.clone());

    let opts = RunOptions {
        version_filter: Some("^5$".to_string()),
        watch: Some(WatchOptions {
            period: Duration::from_millis(1),
            iterations: Some(3),
        }),
        ..RunOptions::default()
    };
    p.run(Action::Monitor, &opts).await.unwrap();
    assert_eq!(ci.clears.load(Ordering::SeqCst), 3);
    // No log prompt while watching.
    assert!(operator.transcript().iter().all(|l| !l.starts_with('?')));
}

#[tokio::test]
async fn monitor_stable_reports_stable_builds() {
    let vcs = repo();
    let ci = Arc::new(FakeCi::default());
    ci.set(CiTarget::Stable, &vcs.resolve("v6").unwrap(), "passed");
    let operator = Arc::new(ScriptedOperator::new(true));
    let p = pipeline(&vcs, CiRouter::new(ci), operator.clone());

    let opts = RunOptions {
        version_filter: Some("^6$".to_string()),
        ..RunOptions::default()
    };
    p.run(Action::MonitorStable, &opts).await.unwrap();
    assert_eq!(operator.transcript(), vec!["Stable status for v6: passed"]);
}

#[tokio::test]
async fn legacy_lines_route_to_the_legacy_backend() {
    let vcs = repo();
    let current = Arc::new(FakeCi::default());
    let legacy = Arc::new(FakeCi::default());
    let v5 = vcs.resolve("v5").unwrap();
    legacy.set(CiTarget::Stable, &v5, "passed");
    let router = CiRouter::new(current.clone()).with_legacy(6, legacy.clone());
    let operator = Arc::new(ScriptedOperator::new(true));
    let p = pipeline(&vcs, router, operator.clone());

    p.run(Action::MonitorStable, &RunOptions::default()).await.unwrap();
    assert_eq!(
        operator.transcript(),
        vec!["Stable status for v5: passed", "Stable status for v6: not found"]
    );
}

#[tokio::test]
async fn create_covers_every_stable_branch() {
    let vcs = repo();
    vcs.set_remote_ref("stable", "stable-v4", "master");
    vcs.set_remote_ref("stable", "unrelated", "master");
    let p = pipeline(&vcs, CiRouter::disabled(), Arc::new(ScriptedOperator::new(true)));

    let opts = RunOptions {
        base_version: Some(6),
        ..RunOptions::default()
    };
    let report = p.run(Action::Create, &opts).await.unwrap();
    assert_eq!(report.outcome("dev/stable-v4/master"), Some(&BranchOutcome::Created));
    assert_eq!(report.outcome(V5), Some(&BranchOutcome::AlreadyExists));
    assert_eq!(report.branches.len(), 3);
    assert_eq!(vcs.resolve("dev/stable-v4/master"), vcs.resolve("stable/stable-v4"));
}

#[tokio::test]
async fn reset_drops_local_commits_after_confirmation() {
    let vcs = repo();
    vcs.commit_on(V5, "local experiment", "");
    let operator = Arc::new(ScriptedOperator::new(true));
    let p = pipeline(&vcs, CiRouter::disabled(), operator.clone());

    let report = p.run(Action::Reset, &RunOptions::default()).await.unwrap();
    assert_eq!(report.outcome(V5), Some(&BranchOutcome::Reset));
    assert_eq!(report.outcome(V6), Some(&BranchOutcome::UpToDate));
    assert_eq!(vcs.resolve(V5), vcs.resolve("stable/stable-v5"));
    assert!(operator
        .transcript()
        .contains(&"# Commits dropped by resetting to stable/stable-v5 (1)".to_string()));
}

#[tokio::test]
async fn delete_rules() {
    let vcs = repo();
    vcs.set_branch("dev/stable-v5/rc", V5);
    vcs.set_remote_ref("github", V5, V5);
    let p = pipeline(&vcs, CiRouter::disabled(), Arc::new(ScriptedOperator::new(true)));

    let err = p.run(Action::Delete, &RunOptions::default()).await.unwrap_err();
    assert!(matches!(err, MaintainError::InvalidAction(_)));

    let remote = RunOptions {
        delete_remote: true,
        ..RunOptions::default()
    };
    let report = p.run(Action::Delete, &remote).await.unwrap();
    assert_eq!(report.outcome(V5), Some(&BranchOutcome::Deleted));
    assert!(matches!(report.outcome(V6), Some(BranchOutcome::Skipped { .. })));
    assert_eq!(report.pushes[0].refspecs, vec![format!(":{V5}")]);
    assert!(vcs.resolve(&format!("github/{V5}")).is_none());
    assert!(vcs.has_branch(V5));

    let rc = RunOptions {
        suffix: "rc".to_string(),
        ..RunOptions::default()
    };
    let report = p.run(Action::Delete, &rc).await.unwrap();
    assert_eq!(report.outcome("dev/stable-v5/rc"), Some(&BranchOutcome::Deleted));
    assert!(!vcs.has_branch("dev/stable-v5/rc"));
}

#[tokio::test]
async fn merge_from_another_suffix() {
    let vcs = repo();
    vcs.set_branch("dev/stable-v5/rc", V5);
    vcs.commit_on("dev/stable-v5/rc", "rc fix", "");
    let p = pipeline(&vcs, CiRouter::disabled(), Arc::new(ScriptedOperator::new(true)));

    let err = p.run(Action::Merge, &RunOptions::default()).await.unwrap_err();
    assert!(matches!(err, MaintainError::InvalidAction(_)));

    let opts = RunOptions {
        merge_from: Some("rc".to_string()),
        ..RunOptions::default()
    };
    let report = p.run(Action::Merge, &opts).await.unwrap();
    assert_eq!(report.outcome(V5), Some(&BranchOutcome::Merged));
    assert!(matches!(report.outcome(V6), Some(BranchOutcome::Skipped { .. })));
    let rc = vcs.resolve("dev/stable-v5/rc").unwrap();
    assert!(vcs.is_ancestor(&rc, &vcs.resolve(V5).unwrap()).unwrap());

    let again = p.run(Action::Merge, &opts).await.unwrap();
    assert_eq!(again.outcome(V5), Some(&BranchOutcome::UpToDate));
}

#[tokio::test]
async fn pull_rebases_onto_the_stable_branch() {
    let vcs = repo();
    let local = vcs.commit_on(V5, "local fix", "");
    let published = vcs.commit_on("stable-work", "published fix", "");
    vcs.set_remote_ref("stable", "stable-v5", published.as_str());
    let p = pipeline(&vcs, CiRouter::disabled(), Arc::new(ScriptedOperator::new(true)));

    let opts = RunOptions {
        version_filter: Some("^5$".to_string()),
        ..RunOptions::default()
    };
    let report = p.run(Action::Pull, &opts).await.unwrap();
    assert_eq!(report.outcome(V5), Some(&BranchOutcome::Pulled));
    let head = vcs.resolve(V5).unwrap();
    assert!(vcs.is_ancestor(&published, &head).unwrap());
    assert_eq!(vcs.commit(V5).unwrap().subject, "local fix");
    assert_ne!(head, local);

    let again = p.run(Action::Pull, &opts).await.unwrap();
    assert_eq!(again.outcome(V5), Some(&BranchOutcome::UpToDate));
}

#[tokio::test]
async fn list_shows_unpublished_commits() {
    let vcs = repo();
    vcs.commit_on(V6, "fix a", "");
    vcs.commit_on(V6, "fix b", "");
    let operator = Arc::new(ScriptedOperator::new(true));
    let p = pipeline(&vcs, CiRouter::disabled(), operator.clone());

    let report = p.run(Action::List, &RunOptions::default()).await.unwrap();
    assert_eq!(report.outcome(V5), Some(&BranchOutcome::Listed { commits: 0 }));
    assert_eq!(report.outcome(V6), Some(&BranchOutcome::Listed { commits: 2 }));
    assert_eq!(vcs.current_branch(), "master");
}

#[tokio::test]
async fn release_tags_the_next_stable_version() {
    let vcs = repo();
    vcs.tag("v5.0", V5);
    vcs.commit_on(V5, "fix a", "");
    vcs.commit_on(V5, "fix b", "");
    let p = pipeline(&vcs, CiRouter::disabled(), Arc::new(ScriptedOperator::new(true)));

    let opts = RunOptions {
        version_filter: Some("^5$".to_string()),
        ..RunOptions::default()
    };
    let report = p.run(Action::Release, &opts).await.unwrap();
    assert_eq!(
        report.outcome(V5),
        Some(&BranchOutcome::Released {
            tag: "v5.1".to_string()
        })
    );
    assert_eq!(vcs.resolve("v5.1"), vcs.resolve(V5));
    assert_eq!(
        vcs.tag_message("v5.1").unwrap(),
        "rdma-core-5.1:\n\nUpdates from version 5.0\n * Backport fixes:\n   * fix a\n   * fix b\n"
    );

    let major = RunOptions {
        release: ReleaseKind::Major(None),
        ..opts
    };
    let report = p.run(Action::Release, &major).await.unwrap();
    assert_eq!(
        report.outcome(V5),
        Some(&BranchOutcome::Released {
            tag: "v6.0".to_string()
        })
    );
}

#[tokio::test]
async fn submit_release_pushes_missing_tags() {
    let vcs = repo();
    vcs.tag("v5.0", "v5");
    vcs.tag("v5.1", "v5");
    for tag in ["v5", "v6", "v5.0"] {
        vcs.add_remote_tag("stable", tag);
    }
    let p = pipeline(&vcs, CiRouter::disabled(), Arc::new(ScriptedOperator::new(true)));

    let report = p.run(Action::SubmitRelease, &RunOptions::default()).await.unwrap();
    assert_eq!(
        report.global,
        Some(GlobalOutcome::Submitted {
            tags: vec!["v5.1".to_string()]
        })
    );
    assert_eq!(vcs.pushes()[0].refspecs, vec!["refs/tags/v5.1".to_string()]);

    let again = p.run(Action::SubmitRelease, &RunOptions::default()).await.unwrap();
    assert_eq!(again.global, Some(GlobalOutcome::NothingToSubmit));
}

#[tokio::test]
async fn submit_release_needs_two_confirmations() {
    let vcs = repo();
    vcs.tag("v5.1", "v5");
    let operator = Arc::new(ScriptedOperator::new(true).with_answers([true, false]));
    let p = pipeline(&vcs, CiRouter::disabled(), operator);

    let err = p.run(Action::SubmitRelease, &RunOptions::default()).await.unwrap_err();
    assert!(matches!(err, MaintainError::Cancelled));
    assert!(vcs.pushes().is_empty());
}

#[tokio::test]
async fn list_branches_applies_targeting() {
    let vcs = repo();
    vcs.set_branch("dev/stable-v4/master", "master");
    vcs.set_branch("dev/stable-v5/rc", V5);
    let p = pipeline(&vcs, CiRouter::disabled(), Arc::new(ScriptedOperator::new(true)));

    let report = p.run(Action::ListBranches, &RunOptions::default()).await.unwrap();
    assert_eq!(
        report.global,
        Some(GlobalOutcome::Branches {
            versions: vec!["4".into(), "5".into(), "6".into()]
        })
    );

    let opts = RunOptions {
        base_version: Some(5),
        version_filter: Some("^6".to_string()),
        ..RunOptions::default()
    };
    let report = p.run(Action::ListBranches, &opts).await.unwrap();
    assert_eq!(
        report.global,
        Some(GlobalOutcome::Branches {
            versions: vec!["6".into()]
        })
    );
}

#[tokio::test]
async fn missing_branch_fails_checkout() {
    let vcs = repo();
    let p = pipeline(&vcs, CiRouter::disabled(), Arc::new(ScriptedOperator::new(true)));
    let opts = RunOptions {
        branch: Some("dev/stable-v9/master".to_string()),
        ..RunOptions::default()
    };
    let err = p.run(Action::Reset, &opts).await.unwrap_err();
    assert!(matches!(err, MaintainError::Checkout { .. }));
}
