//! CI build state as seen by the promotion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which remote a build was triggered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiTarget {
    Validation,
    Stable,
}

impl std::fmt::Display for CiTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CiTarget::Validation => write!(f, "validation"),
            CiTarget::Stable => write!(f, "stable"),
        }
    }
}

/// Normalised build status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiStatus {
    NotFound,
    Running,
    Succeeded,
    Failed,
}

impl CiStatus {
    /// Map a provider state string onto the normalised status.
    ///
    /// Unknown strings are treated as failures: a provider reporting a
    /// state we cannot interpret must not unlock promotion.
    pub fn from_provider(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "succeeded" | "passed" => CiStatus::Succeeded,
            "running" | "started" | "created" | "queued" | "inprogress" | "notstarted" => {
                CiStatus::Running
            }
            "not found" | "not_found" | "" => CiStatus::NotFound,
            _ => CiStatus::Failed,
        }
    }
}

/// State of the build associated with one `(branch, commit)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiBuild {
    pub status: CiStatus,
    /// State string exactly as the provider reported it.
    pub raw_state: String,
    pub started_at: Option<DateTime<Utc>>,
}

impl CiBuild {
    pub fn not_found() -> Self {
        Self {
            status: CiStatus::NotFound,
            raw_state: "not found".to_string(),
            started_at: None,
        }
    }

    pub fn new(raw_state: impl Into<String>, started_at: Option<DateTime<Utc>>) -> Self {
        let raw_state = raw_state.into();
        Self {
            status: CiStatus::from_provider(&raw_state),
            raw_state,
            started_at,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == CiStatus::Succeeded
    }
}
