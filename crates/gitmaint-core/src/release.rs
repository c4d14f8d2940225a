//! Release computation: next version, tag name and tag message.

use serde::{Deserialize, Serialize};

use crate::domain::{Branch, MaintainError, Result};
use crate::vcs::{LogQuery, VersionControl};

/// Which component of the version to bump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "version", rename_all = "snake_case")]
pub enum ReleaseKind {
    /// Bump the last component.
    #[default]
    Stable,
    /// Bump the second-to-last component (or use the given version).
    Major(Option<String>),
}

/// A release about to be tagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePlan {
    pub previous_tag: String,
    pub previous: String,
    pub version: String,
    pub tag: String,
    /// Subjects backported since `previous_tag`, oldest first.
    pub changes: Vec<String>,
    pub message: String,
}

/// Per-repository release behaviour.
pub trait ReleaseStrategy: Send + Sync {
    fn plan(&self, vcs: &dyn VersionControl, branch: &Branch, kind: &ReleaseKind)
        -> Result<ReleasePlan>;

    /// Record the release in the repository.
    fn publish(&self, vcs: &dyn VersionControl, plan: &ReleasePlan) -> Result<()>;
}

/// Default strategy: annotated `v<version>` tags on the stable branch.
#[derive(Debug, Clone)]
pub struct TagRelease {
    /// Name used in the tag message header.
    pub project: String,
    pub sign: bool,
}

impl TagRelease {
    pub fn new(project: impl Into<String>, sign: bool) -> Self {
        Self {
            project: project.into(),
            sign,
        }
    }
}

impl ReleaseStrategy for TagRelease {
    fn plan(
        &self,
        vcs: &dyn VersionControl,
        branch: &Branch,
        kind: &ReleaseKind,
    ) -> Result<ReleasePlan> {
        let (previous_tag, previous) = vcs
            .tags("v*", Some(&branch.local))?
            .into_iter()
            .filter_map(|tag| {
                let version = tag.strip_prefix('v')?.to_string();
                let parsed = parse_version(&version)?;
                Some((parsed, tag, version))
            })
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, tag, version)| (tag, version))
            .ok_or_else(|| {
                MaintainError::Config(format!("no release tag found on {}", branch.local))
            })?;

        let version = next_version(&previous, kind)?;
        let changes = vcs
            .log(&LogQuery::range(previous_tag.as_str(), branch.local.as_str()).no_merges().oldest_first())?
            .into_iter()
            .map(|id| vcs.commit(id.as_str()).map(|c| c.subject))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut message = format!(
            "{}-{version}:\n\nUpdates from version {previous}\n * Backport fixes:\n",
            self.project
        );
        for subject in &changes {
            message.push_str(&format!("   * {subject}\n"));
        }

        Ok(ReleasePlan {
            tag: format!("v{version}"),
            previous_tag,
            previous,
            version,
            changes,
            message,
        })
    }

    fn publish(&self, vcs: &dyn VersionControl, plan: &ReleasePlan) -> Result<()> {
        vcs.create_release_tag(&plan.tag, &plan.message, self.sign)?;
        Ok(())
    }
}

fn parse_version(version: &str) -> Option<Vec<u64>> {
    version.split('.').map(|p| p.parse().ok()).collect()
}

/// Version following `previous` for the given kind.
pub fn next_version(previous: &str, kind: &ReleaseKind) -> Result<String> {
    let mut parts = parse_version(previous)
        .ok_or_else(|| MaintainError::Config(format!("unparsable version {previous}")))?;
    match kind {
        ReleaseKind::Major(Some(explicit)) => Ok(explicit.clone()),
        ReleaseKind::Stable => {
            if let Some(last) = parts.last_mut() {
                *last += 1;
            }
            Ok(join(&parts))
        }
        ReleaseKind::Major(None) => {
            if parts.len() < 2 {
                parts[0] += 1;
                parts.push(0);
            } else {
                let idx = parts.len() - 2;
                parts[idx] += 1;
                parts.truncate(idx + 1);
                parts.push(0);
            }
            Ok(join(&parts))
        }
    }
}

fn join(parts: &[u64]) -> String {
    parts
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(".")
}
