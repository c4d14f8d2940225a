//! Stable branch identity and derived refs.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Suffix reserved for the primary line of each stable version.
pub const PRIMARY_SUFFIX: &str = "master";

/// Version of a stable line, e.g. `5`, `4.19` or `master`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchVersion(String);

impl BranchVersion {
    pub fn new(version: impl Into<String>) -> Self {
        BranchVersion(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric components, `None` for named lines such as `master`.
    pub fn components(&self) -> Option<Vec<u64>> {
        self.0.split('.').map(|p| p.parse::<u64>().ok()).collect()
    }

    /// Leading numeric component.
    pub fn major(&self) -> Option<u64> {
        self.components().and_then(|c| c.first().copied())
    }

    /// Whether this is a named (non-numeric) line that always tracks the
    /// newest infrastructure.
    pub fn is_mainline(&self) -> bool {
        self.components().is_none()
    }
}

impl Ord for BranchVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.components(), other.components()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for BranchVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for BranchVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a branch entered the working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
    /// Discovered through the configured local branch naming pattern.
    Standard,
    /// Named explicitly by the operator.
    UserSpecified,
}

/// A maintained stable branch and the refs derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub version: BranchVersion,
    pub suffix: String,
    pub kind: BranchKind,
    /// Local branch name, e.g. `dev/stable-v5/master`.
    pub local: String,
    /// Branch name on the stable remote, e.g. `stable-v5`.
    pub stable_branch: String,
    pub validation_remote: String,
    pub stable_remote: String,
}

impl Branch {
    /// Remote-tracking ref of this branch on the validation remote.
    pub fn validation_ref(&self) -> String {
        format!("{}/{}", self.validation_remote, self.local)
    }

    /// Remote-tracking ref of the published stable branch.
    pub fn stable_ref(&self) -> String {
        format!("{}/{}", self.stable_remote, self.stable_branch)
    }

    pub fn is_primary(&self) -> bool {
        self.suffix == PRIMARY_SUFFIX
    }

    /// Short label used in operator output (`v5`).
    pub fn label(&self) -> String {
        format!("v{}", self.version)
    }
}
