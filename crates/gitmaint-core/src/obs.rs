//! Structured lifecycle events for pipeline runs.
//!
//! Every run gets a `run_id`; [`run_span`] tags all log lines of the run
//! with it and the action name. Events are emitted at `info!` level.

use tracing::{info, warn};

/// Span covering one pipeline run, for use with `Instrument`.
pub fn run_span(run_id: &str, action: &str) -> tracing::Span {
    tracing::info_span!("maintain.run", run_id = %run_id, action = %action)
}

pub fn emit_run_started(run_id: &str, action: &str, branches: usize) {
    info!(event = "run.started", run_id = %run_id, action = %action, branches = branches);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        success = success,
    );
}

/// One upstream commit processed by `steal` or `cp`.
pub fn emit_commit_outcome(branch: &str, commit: &str, outcome: &str) {
    info!(event = "commit.outcome", branch = %branch, commit = %commit, outcome = %outcome);
}

pub fn emit_checkpoint_advanced(base: &str, marker: &str) {
    info!(event = "checkpoint.advanced", base = %base, marker = %marker);
}

pub fn emit_checkpoint_held(base: &str, reason: &str) {
    warn!(event = "checkpoint.held", base = %base, reason = %reason);
}

pub fn emit_push_batch(remote: &str, refspecs: usize, force: bool) {
    info!(event = "push.batch", remote = %remote, refspecs = refspecs, force = force);
}

pub fn emit_escalation(branch: &str, escalation_id: &str, kind: &str) {
    warn!(event = "escalation", branch = %branch, escalation_id = %escalation_id, kind = %kind);
}
