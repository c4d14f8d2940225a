//! Error taxonomy for git-maintain.

use crate::domain::commit::CommitId;

/// Failure reported by the version-control capability.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("unknown revision: {0}")]
    UnknownRevision(String),
}

/// Failure reported by a CI provider.
#[derive(Debug, thiserror::Error)]
pub enum CiError {
    #[error("CI request failed '{url}': {status}")]
    Request { url: String, status: String },

    #[error("incomplete payload received from {provider}: {detail}")]
    Payload { provider: String, detail: String },

    #[error("{provider} build not found for {commit}")]
    BuildNotFound { provider: String, commit: String },

    #[error("{0} organisation not provided")]
    MissingOrganisation(String),

    #[error("no CI provider configured for {0}")]
    NoProvider(String),
}

/// git-maintain domain errors.
#[derive(Debug, thiserror::Error)]
pub enum MaintainError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to checkout branch {branch}: {detail}")]
    Checkout { branch: String, detail: String },

    /// A cherry-pick could not be applied after every fallback; the working
    /// tree is left in the conflicted state for the operator.
    #[error("failed to cherry-pick commit {commit}")]
    Conflict { commit: CommitId },

    #[error("action {action} can only be done on '{required}' suffixed branches (got '{suffix}')")]
    InvalidSuffix {
        action: String,
        required: String,
        suffix: String,
    },

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("cancelled by user")]
    Cancelled,

    #[error("git error: {0}")]
    Vcs(#[from] VcsError),

    #[error("CI error: {0}")]
    Ci(#[from] CiError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MaintainError {
    /// Whether the error is a recoverable conflict the driver escalates.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result type for git-maintain operations.
pub type Result<T> = std::result::Result<T, MaintainError>;
