//! git-maintain - stable branch maintenance CLI
//!
//! The `git-maintain` command runs one maintenance action over the local
//! stable branches of the repository in the current directory.
//!
//! ## Actions
//!
//! - `steal`, `cp`: backport upstream fixes
//! - `push`, `monitor`, `push_stable`, `monitor_stable`: CI-gated promotion
//! - `release`, `submit_release`: tagging and publishing releases
//! - `create`, `delete`, `reset`, `merge`, `pull`, `list`, `list_branches`:
//!   branch housekeeping

mod terminal;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, FromArgMatches, Parser};
use gitmaint_ci::{build_router, HttpTransport};
use gitmaint_core::config::env_flag;
use gitmaint_core::telemetry::init_tracing;
use gitmaint_core::{
    Action, BranchOutcome, GitCli, GlobalOutcome, MaintainContext, PromotionPipeline,
    ReleaseKind, RepoConfig, RunOptions, RunReport, StartMode, StrategyRegistry, WatchOptions,
    PRIMARY_SUFFIX,
};
use tracing::{debug, Level};

use terminal::TerminalOperator;

#[derive(Parser, Debug)]
#[command(name = "git-maintain")]
#[command(version = env!("CARGO_PKG_VERSION"), disable_version_flag = true)]
#[command(about = "Maintain stable branches: backports, CI-gated promotion and releases", long_about = None)]
struct Cli {
    /// Action to run
    #[arg(value_parser = parse_action)]
    action: Action,

    /// Commits to backport (`cp`)
    commits: Vec<String>,

    /// Branch suffix to work on
    #[arg(short = 'b', long = "branch-suffix", default_value = PRIMARY_SUFFIX)]
    suffix: String,

    /// Skip branches older than this major version
    #[arg(long = "base-ver", value_name = "N")]
    base_version: Option<u64>,

    /// Only work on versions matching this regex
    #[arg(long = "version", value_name = "REGEX")]
    version_filter: Option<String>,

    /// Work on this branch only
    #[arg(long)]
    branch: Option<String>,

    /// Do not fetch remotes first
    #[arg(long)]
    no_fetch: bool,

    /// Steal from the stable base, ignoring the checkpoint
    #[arg(long, conflicts_with = "start")]
    all: bool,

    /// Steal from this revision
    #[arg(long, value_name = "REV")]
    start: Option<String>,

    /// Keep backported commit messages unchanged
    #[arg(long)]
    no_edit: bool,

    /// Force-push to the validation remote
    #[arg(short, long)]
    force: bool,

    /// Push to the stable remote without checking CI
    #[arg(long)]
    no_ci_check: bool,

    /// Suffix of the branch to merge from (`merge`)
    #[arg(long, value_name = "SUFFIX")]
    from: Option<String>,

    /// Delete the validation remote branch instead of the local one
    #[arg(long)]
    remote: bool,

    /// Major release, optionally with an explicit version
    #[arg(long, value_name = "VERSION", num_args = 0..=1, default_missing_value = "")]
    major: Option<String>,

    /// Repeat monitoring every SECS seconds until interrupted
    #[arg(long, value_name = "SECS")]
    watch: Option<u64>,

    /// Answer yes to every question
    #[arg(short = 'y', long, conflicts_with = "no")]
    yes: bool,

    /// Answer no to every question
    #[arg(short = 'n', long)]
    no: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines and a JSON run report
    #[arg(long)]
    json: bool,
}

fn parse_action(s: &str) -> std::result::Result<Action, String> {
    s.parse::<Action>().map_err(|e| e.to_string())
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        let start = match (&self.start, self.all) {
            (_, true) => StartMode::All,
            (Some(rev), false) => StartMode::Explicit(rev.clone()),
            (None, false) => StartMode::Default,
        };
        let release = match self.major.as_deref() {
            None => ReleaseKind::Stable,
            Some("") => ReleaseKind::Major(None),
            Some(version) => ReleaseKind::Major(Some(version.to_string())),
        };
        RunOptions {
            suffix: self.suffix.clone(),
            base_version: self.base_version,
            version_filter: self.version_filter.clone(),
            branch: self.branch.clone(),
            fetch: !self.no_fetch,
            commits: self.commits.clone(),
            start,
            no_edit: self.no_edit,
            force: self.force,
            skip_ci_check: self.no_ci_check,
            merge_from: self.from.clone(),
            delete_remote: self.remote,
            release,
            watch: self.watch.map(|secs| WatchOptions {
                period: Duration::from_secs(secs),
                iterations: None,
            }),
        }
    }

    fn auto_answer(&self) -> Option<bool> {
        match (self.yes, self.no) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

/// Parse the command line, listing every action in `--help`.
fn parse_cli() -> Result<Cli> {
    let actions = Action::usage().join("\n");
    let matches = Cli::command()
        .after_help(format!("Actions:\n{actions}"))
        .get_matches();
    Ok(Cli::from_arg_matches(&matches)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_cli()?;

    // Setup logging
    let level = if cli.verbose || env_flag("DEBUG") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level, env_flag("DEBUG_CI"));

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let vcs = Arc::new(GitCli::open(&cwd).context("Not inside a git work tree")?);
    let config = RepoConfig::load(vcs.as_ref()).context("Failed to read maintain configuration")?;
    debug!(?config, "configuration loaded");

    let strategies = StrategyRegistry::builtin()
        .resolve(&config)
        .context("Failed to resolve repository strategies")?;
    let transport = Arc::new(HttpTransport::new().context("Failed to create HTTP client")?);
    let ci = build_router(
        &strategies.ci_routing,
        &config.ci,
        &config.repo_name,
        transport,
    )
    .context("Failed to configure CI")?;

    let workdir: PathBuf = vcs.workdir().to_path_buf();
    let operator = Arc::new(TerminalOperator::new(workdir, cli.auto_answer()));
    let pipeline = PromotionPipeline::new(MaintainContext::new(
        vcs, config, strategies, ci, operator,
    ));

    let report = pipeline
        .run(cli.action, &cli.run_options())
        .await
        .with_context(|| format!("Action {} failed", cli.action))?;

    if cli.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

/// One line per branch, `None` when the action already printed its result.
fn describe(outcome: &BranchOutcome) -> Option<String> {
    Some(match outcome {
        BranchOutcome::Stolen(r) | BranchOutcome::Picked(r) => {
            let mut line = format!(
                "{} applied, {} escalated, {} examined",
                r.applied(),
                r.escalated(),
                r.outcomes.len()
            );
            if r.checkpoint_advanced {
                line.push_str(", checkpoint advanced");
            }
            line
        }
        BranchOutcome::Listed { .. } | BranchOutcome::CiState { .. } => return None,
        BranchOutcome::Queued { refspec } => format!("queued {refspec}"),
        BranchOutcome::NothingToPush => "nothing to push".to_string(),
        BranchOutcome::Declined => "skipped on request".to_string(),
        BranchOutcome::Skipped { reason } => format!("skipped: {reason}"),
        BranchOutcome::UpToDate => "up to date".to_string(),
        BranchOutcome::Reset => "reset".to_string(),
        BranchOutcome::Created => "created".to_string(),
        BranchOutcome::AlreadyExists => "already exists".to_string(),
        BranchOutcome::Deleted => "deleted".to_string(),
        BranchOutcome::Merged => "merged".to_string(),
        BranchOutcome::Pulled => "rebased".to_string(),
        BranchOutcome::Released { tag } => format!("released {tag}"),
    })
}

fn print_summary(report: &RunReport) {
    for branch in &report.branches {
        if let Some(line) = describe(&branch.outcome) {
            println!("{}: {line}", branch.branch);
        }
    }
    for batch in &report.pushes {
        println!(
            "Pushed {} ref(s) to {}{}",
            batch.refspecs.len(),
            batch.remote,
            if batch.force { " (forced)" } else { "" }
        );
    }
    match &report.global {
        Some(GlobalOutcome::Submitted { tags }) => println!("Submitted {}", tags.join(" ")),
        Some(GlobalOutcome::Branches { .. }) | Some(GlobalOutcome::NothingToSubmit) | None => {}
    }
}
