//! Travis-style backend: one "branches" listing per repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gitmaint_core::{Branch, CiBuild, CiError, CiProvider, CiTarget, CommitId};
use serde::Deserialize;
use tracing::debug;

use crate::cache::ResponseCache;
use crate::transport::CiTransport;

pub const DEFAULT_URL: &str = "https://api.travis-ci.org/";

#[derive(Debug, Deserialize)]
struct BranchesResponse {
    branches: Vec<BranchEntry>,
    commits: Vec<CommitEntry>,
}

#[derive(Debug, Deserialize)]
struct BranchEntry {
    commit_id: u64,
    state: String,
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    job_ids: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    id: u64,
    sha: String,
}

/// Travis backend for one validation and one stable repository.
pub struct TravisProvider {
    base_url: String,
    validation_slug: Option<String>,
    stable_slug: Option<String>,
    transport: Arc<dyn CiTransport>,
    cache: ResponseCache,
}

impl TravisProvider {
    /// `base_url` must end with a slash; slugs are `owner/repo`.
    pub fn new(
        base_url: impl Into<String>,
        validation_slug: Option<String>,
        stable_slug: Option<String>,
        transport: Arc<dyn CiTransport>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            validation_slug,
            stable_slug,
            transport,
            cache: ResponseCache::new(),
        }
    }

    fn slug(&self, target: CiTarget) -> Result<&str, CiError> {
        let slug = match target {
            CiTarget::Validation => self.validation_slug.as_deref(),
            CiTarget::Stable => self.stable_slug.as_deref(),
        };
        slug.ok_or_else(|| CiError::MissingOrganisation(format!("Travis {target}")))
    }

    async fn branches(&self, target: CiTarget) -> Result<BranchesResponse, CiError> {
        let slug = self.slug(target)?;
        let url = format!("{}repos/{slug}/branches", self.base_url);
        let body = self
            .cache
            .get_or_fetch(self.transport.as_ref(), &format!("br_{target}"), &url)
            .await?;
        serde_json::from_str(&body).map_err(|e| payload(e.to_string()))
    }

    async fn find(&self, target: CiTarget, commit: &CommitId) -> Result<Option<BranchEntry>, CiError> {
        let resp = self.branches(target).await?;
        debug!(commit = %commit, "looking for build");
        for entry in resp.branches {
            let sha = resp
                .commits
                .iter()
                .find(|c| c.id == entry.commit_id)
                .map(|c| c.sha.as_str())
                .ok_or_else(|| payload(format!("no commit for id {}", entry.commit_id)))?;
            debug!(%sha, "found entry");
            if sha == commit.as_str() {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}

fn payload(detail: String) -> CiError {
    CiError::Payload {
        provider: "travis".to_string(),
        detail,
    }
}

pub(crate) fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

#[async_trait]
impl CiProvider for TravisProvider {
    fn name(&self) -> &str {
        "travis"
    }

    async fn build(
        &self,
        target: CiTarget,
        _branch: &Branch,
        commit: &CommitId,
    ) -> Result<CiBuild, CiError> {
        Ok(match self.find(target, commit).await? {
            Some(entry) => CiBuild::new(entry.state, parse_timestamp(entry.started_at.as_deref())),
            None => CiBuild::not_found(),
        })
    }

    async fn log(
        &self,
        target: CiTarget,
        _branch: &Branch,
        commit: &CommitId,
    ) -> Result<String, CiError> {
        let entry = self
            .find(target, commit)
            .await?
            .ok_or_else(|| CiError::BuildNotFound {
                provider: "travis".to_string(),
                commit: commit.to_string(),
            })?;
        let job = entry
            .job_ids
            .last()
            .ok_or_else(|| payload("build has no jobs".to_string()))?;
        let url = format!("{}jobs/{job}/log", self.base_url);
        self.cache
            .get_or_fetch(self.transport.as_ref(), &format!("log_{job}"), &url)
            .await
    }

    fn is_errored(&self, build: &CiBuild) -> bool {
        matches!(build.raw_state.as_str(), "failed" | "errored")
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_branches_payload() {
        let body = r#"{
            "branches": [{"id": 1, "commit_id": 7, "state": "passed",
                          "started_at": "2021-03-04T05:06:07Z", "job_ids": [3, 4]}],
            "commits": [{"id": 7, "sha": "abc"}]
        }"#;
        let resp: BranchesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.branches[0].job_ids, vec![3, 4]);
        assert_eq!(resp.commits[0].sha, "abc");
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp(Some("2021-03-04T05:06:07Z")).unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2021-03-04 05:06:07");
        assert!(parse_timestamp(Some("yesterday")).is_none());
        assert!(parse_timestamp(None).is_none());
    }
}
