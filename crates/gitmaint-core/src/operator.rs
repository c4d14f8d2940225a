//! Operator interaction: confirmations, range listings and interactive
//! escalation when automation cannot continue.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{CommitId, Result};

/// Why the pipeline handed control to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscalationReason {
    /// A backport conflicted after every alternate.
    Conflict { commit: CommitId },
    /// A commit without upstream counterpart was applied and needs review.
    CustomCommit { commit: CommitId },
    MergeFailed { source: String },
    RebaseFailed { onto: String },
}

impl EscalationReason {
    pub fn kind(&self) -> &'static str {
        match self {
            EscalationReason::Conflict { .. } => "conflict",
            EscalationReason::CustomCommit { .. } => "custom_commit",
            EscalationReason::MergeFailed { .. } => "merge_failed",
            EscalationReason::RebaseFailed { .. } => "rebase_failed",
        }
    }
}

/// A request for the operator to fix the working tree by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub escalation_id: String,
    /// Local branch checked out in the working tree.
    pub branch: String,
    pub reason: EscalationReason,
    pub initiated_at: DateTime<Utc>,
}

impl Escalation {
    pub fn new(branch: impl Into<String>, reason: EscalationReason) -> Self {
        Self {
            escalation_id: Uuid::new_v4().to_string(),
            branch: branch.into(),
            reason,
            initiated_at: Utc::now(),
        }
    }

    /// One-line description shown before the session starts.
    pub fn summary(&self) -> String {
        match &self.reason {
            EscalationReason::Conflict { commit } => format!(
                "Failed to cherry-pick commit {} on {}. Fix the tree and commit, or exit non-zero to abort",
                commit.short(),
                self.branch
            ),
            EscalationReason::CustomCommit { commit } => format!(
                "Commit {} has no upstream counterpart. Review it on {} and exit",
                commit.short(),
                self.branch
            ),
            EscalationReason::MergeFailed { source } => {
                format!("Merge of {source} into {} failed. Fix it and exit", self.branch)
            }
            EscalationReason::RebaseFailed { onto } => {
                format!("Rebase of {} onto {onto} failed. Fix it and exit", self.branch)
            }
        }
    }
}

/// How the operator left an escalation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionExit {
    Resume,
    Abort,
}

/// Everything the pipeline asks of a human.
pub trait Operator: Send + Sync {
    fn confirm(&self, question: &str) -> bool;

    /// Show a titled list of commits or refs.
    fn show_range(&self, title: &str, lines: &[String]);

    /// Page through a CI build log.
    fn show_log(&self, log: &str) -> Result<()>;

    /// A status line meant for the operator rather than the log.
    fn report(&self, line: &str);

    /// Hand over the working tree until the operator leaves the session.
    fn escalate(&self, escalation: &Escalation) -> Result<SessionExit>;
}

type EscalationHook = Box<dyn Fn(&Escalation) -> SessionExit + Send + Sync>;

/// Non-interactive operator driven by queued answers.
///
/// Unqueued confirmations fall back to `default_answer`. The escalation
/// hook stands in for the interactive shell.
pub struct ScriptedOperator {
    answers: Mutex<VecDeque<bool>>,
    default_answer: bool,
    hook: Option<EscalationHook>,
    transcript: Mutex<Vec<String>>,
    escalations: Mutex<Vec<Escalation>>,
}

impl ScriptedOperator {
    pub fn new(default_answer: bool) -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            default_answer,
            hook: None,
            transcript: Mutex::new(Vec::new()),
            escalations: Mutex::new(Vec::new()),
        }
    }

    pub fn with_answers(self, answers: impl IntoIterator<Item = bool>) -> Self {
        self.answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(answers);
        self
    }

    pub fn on_escalation(
        mut self,
        hook: impl Fn(&Escalation) -> SessionExit + Send + Sync + 'static,
    ) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Questions, listings and reports, in order.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn escalations(&self) -> Vec<Escalation> {
        self.escalations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record(&self, line: String) {
        self.transcript
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line);
    }
}

impl Operator for ScriptedOperator {
    fn confirm(&self, question: &str) -> bool {
        self.record(format!("? {question}"));
        self.answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(self.default_answer)
    }

    fn show_range(&self, title: &str, lines: &[String]) {
        self.record(format!("# {title} ({})", lines.len()));
    }

    fn show_log(&self, log: &str) -> Result<()> {
        self.record(format!("log: {} bytes", log.len()));
        Ok(())
    }

    fn report(&self, line: &str) {
        self.record(line.to_string());
    }

    fn escalate(&self, escalation: &Escalation) -> Result<SessionExit> {
        self.escalations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(escalation.clone());
        Ok(match &self.hook {
            Some(hook) => hook(escalation),
            None => SessionExit::Abort,
        })
    }
}
