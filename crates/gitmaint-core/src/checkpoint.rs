//! Steal checkpoints: the last upstream commit fully processed for a stable
//! base, stored as a lightweight tag.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{CommitId, MaintainError, Result};
use crate::vcs::VersionControl;

pub const CHECKPOINT_TAG_PREFIX: &str = "checkpoint/steal/last";

/// Where a steal run starts scanning upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "rev", rename_all = "snake_case")]
pub enum StartMode {
    /// From the checkpoint when one exists, otherwise from the stable base.
    #[default]
    Default,
    /// From the stable base, ignoring the checkpoint.
    All,
    /// From an operator-supplied revision.
    Explicit(String),
}

/// A resolved start point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPoint {
    pub commit: CommitId,
    pub from_checkpoint: bool,
}

/// Reads and moves checkpoint tags.
pub struct CheckpointStore<'a> {
    vcs: &'a dyn VersionControl,
}

impl<'a> CheckpointStore<'a> {
    pub fn new(vcs: &'a dyn VersionControl) -> Self {
        Self { vcs }
    }

    pub fn tag_name(stable_base: &str) -> String {
        format!("{CHECKPOINT_TAG_PREFIX}/{stable_base}")
    }

    /// Current checkpoint of `stable_base`, if any.
    pub fn last(&self, stable_base: &str) -> Option<CommitId> {
        self.vcs.resolve(&Self::tag_name(stable_base))
    }

    pub fn resolve_start_point(&self, stable_base: &str, mode: &StartMode) -> Result<StartPoint> {
        let base = || {
            self.vcs.resolve(stable_base).ok_or_else(|| {
                MaintainError::Config(format!("could not resolve stable base {stable_base}"))
            })
        };
        match mode {
            StartMode::Explicit(rev) => {
                let commit = self.vcs.resolve(rev).ok_or_else(|| {
                    MaintainError::Config(format!("could not resolve start point {rev}"))
                })?;
                Ok(StartPoint {
                    commit,
                    from_checkpoint: false,
                })
            }
            StartMode::All => Ok(StartPoint {
                commit: base()?,
                from_checkpoint: false,
            }),
            StartMode::Default => match self.last(stable_base) {
                Some(commit) => Ok(StartPoint {
                    commit,
                    from_checkpoint: true,
                }),
                None => Ok(StartPoint {
                    commit: base()?,
                    from_checkpoint: false,
                }),
            },
        }
    }

    /// Whether a scan from `start` leaves nothing unprocessed before the
    /// checkpoint (or the stable base when there is none).
    pub fn covers(&self, stable_base: &str, start: &CommitId) -> Result<bool> {
        let reference = match self.last(stable_base) {
            Some(commit) => commit,
            None => self.vcs.resolve(stable_base).ok_or_else(|| {
                MaintainError::Config(format!("could not resolve stable base {stable_base}"))
            })?,
        };
        Ok(&reference == start || self.vcs.is_ancestor(start, &reference)?)
    }

    /// Move the checkpoint to `marker`. Refuses to move it backwards and
    /// returns whether it moved.
    pub fn advance(&self, stable_base: &str, marker: &CommitId) -> Result<bool> {
        if let Some(current) = self.last(stable_base) {
            if &current == marker {
                return Ok(false);
            }
            if !self.vcs.is_ancestor(&current, marker)? {
                warn!(
                    base = %stable_base,
                    current = %current.short(),
                    marker = %marker.short(),
                    "checkpoint is not an ancestor of the new marker, keeping it"
                );
                return Ok(false);
            }
        }
        self.vcs.set_tag(&Self::tag_name(stable_base), marker)?;
        info!(base = %stable_base, marker = %marker.short(), "checkpoint advanced");
        Ok(true)
    }
}
