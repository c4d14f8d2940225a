//! Steal runs against a real git working tree.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use gitmaint_core::{
    Action, BranchOutcome, CiRouter, CommitOutcome, GitCli, MaintainContext, MaintainError,
    PromotionPipeline, RepoConfig, RunOptions, ScriptedOperator, StrategyRegistry, VersionControl,
};

const V5: &str = "dev/stable-v5/master";

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn commit_file(dir: &Path, file: &str, content: &str, message: &[&str]) -> String {
    std::fs::write(dir.join(file), content).unwrap();
    git(dir, &["add", file]);
    let mut args = vec!["commit", "-q"];
    for paragraph in message {
        args.push("-m");
        args.push(paragraph);
    }
    git(dir, &args);
    git(dir, &["rev-parse", "HEAD"])
}

/// `master` tagged `v5`, a stable branch from it and an `upstream` branch
/// carrying one fix and one unrelated change.
fn make_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path();
    git(path, &["init", "-q", "-b", "master"]);
    git(path, &["config", "user.name", "test-user"]);
    git(path, &["config", "user.email", "test@example.com"]);
    git(path, &["config", "commit.gpgsign", "false"]);
    git(path, &["config", "maintain.upstream-ref", "upstream"]);

    commit_file(path, "core.c", "int core;\n", &["core"]);
    git(path, &["tag", "v5"]);
    git(path, &["branch", V5]);

    git(path, &["checkout", "-q", "-b", "upstream"]);
    commit_file(path, "feature.c", "int feature;\n", &["add feature"]);
    commit_file(
        path,
        "core.c",
        "int core = 1;\n",
        &["core: initialise", "Cc: stable@vger.kernel.org"],
    );
    git(path, &["checkout", "-q", "master"]);
    dir
}

fn pipeline(vcs: Arc<GitCli>, operator: Arc<ScriptedOperator>) -> PromotionPipeline {
    let config = RepoConfig::load(vcs.as_ref()).unwrap();
    let strategies = StrategyRegistry::new().resolve(&config).unwrap();
    PromotionPipeline::new(MaintainContext::new(
        vcs,
        config,
        strategies,
        CiRouter::disabled(),
        operator,
    ))
}

fn offline() -> RunOptions {
    RunOptions {
        fetch: false,
        ..RunOptions::default()
    }
}

#[tokio::test]
async fn steal_backports_marked_fix_with_provenance() {
    let repo = make_repo();
    let vcs = Arc::new(GitCli::open(repo.path()).unwrap());
    let fix = vcs.resolve("upstream").unwrap();
    let p = pipeline(vcs.clone(), Arc::new(ScriptedOperator::new(true)));

    let report = p.run(Action::Steal, &offline()).await.unwrap();
    let Some(BranchOutcome::Stolen(stolen)) = report.outcome(V5) else {
        panic!("expected steal outcome");
    };
    assert_eq!(stolen.outcomes.len(), 2);
    assert_eq!(stolen.applied(), 1);
    assert!(matches!(stolen.outcome_of(&fix), Some(CommitOutcome::Applied { .. })));
    assert!(stolen.checkpoint_advanced);

    let head = vcs.commit(V5).unwrap();
    assert_eq!(head.subject, "core: initialise");
    assert!(head.body.contains(&format!("[ Upstream commit {fix} ]")));
    assert_eq!(
        std::fs::read_to_string(repo.path().join("core.c")).unwrap(),
        "int core = 1;\n"
    );
    assert!(!repo.path().join("feature.c").exists());
    assert_eq!(
        vcs.resolve("checkpoint/steal/last/v5"),
        vcs.resolve("upstream")
    );

    let again = p.run(Action::Steal, &offline()).await.unwrap();
    let Some(BranchOutcome::Stolen(stolen)) = again.outcome(V5) else {
        panic!("expected steal outcome");
    };
    assert!(stolen.outcomes.is_empty());
}

#[tokio::test]
async fn aborted_conflict_keeps_checkpoint() {
    let repo = make_repo();
    git(repo.path(), &["checkout", "-q", V5]);
    commit_file(repo.path(), "core.c", "int core = 2;\n", &["core: stable tweak"]);
    git(repo.path(), &["checkout", "-q", "master"]);

    let vcs = Arc::new(GitCli::open(repo.path()).unwrap());
    let operator = Arc::new(ScriptedOperator::new(true));
    let p = pipeline(vcs.clone(), operator.clone());

    let err = p.run(Action::Steal, &offline()).await.unwrap_err();
    assert!(matches!(err, MaintainError::Cancelled));
    assert_eq!(operator.escalations().len(), 1);
    assert!(vcs.resolve("checkpoint/steal/last/v5").is_none());
    assert!(!vcs.is_clean().unwrap());
}
