//! Azure Pipelines backend: the build list of one project per organisation.

use std::sync::Arc;

use async_trait::async_trait;
use gitmaint_core::{Branch, CiBuild, CiError, CiProvider, CiTarget, CommitId};
use serde::Deserialize;
use tracing::debug;

use crate::cache::ResponseCache;
use crate::transport::CiTransport;
use crate::travis::parse_timestamp;

pub const DEFAULT_URL: &str = "https://dev.azure.com/";
const API_VERSION: &str = "api-version=5.1";

#[derive(Debug, Deserialize)]
struct BuildList {
    value: Vec<BuildEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildEntry {
    id: u64,
    source_version: Option<String>,
    /// Unset while the build is running.
    result: Option<String>,
    start_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogList {
    value: Vec<LogEntry>,
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    id: u64,
}

/// Azure Pipelines backend for one project.
pub struct AzureProvider {
    base_url: String,
    project: String,
    valid_org: Option<String>,
    stable_org: Option<String>,
    transport: Arc<dyn CiTransport>,
    cache: ResponseCache,
}

impl AzureProvider {
    pub fn new(
        base_url: impl Into<String>,
        project: impl Into<String>,
        valid_org: Option<String>,
        stable_org: Option<String>,
        transport: Arc<dyn CiTransport>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            project: project.into(),
            valid_org,
            stable_org,
            transport,
            cache: ResponseCache::new(),
        }
    }

    /// `<base>/<org>/<project>/_apis/build/builds` for `target`.
    fn builds_url(&self, target: CiTarget) -> Result<String, CiError> {
        let org = match target {
            CiTarget::Validation => self.valid_org.as_deref(),
            CiTarget::Stable => self.stable_org.as_deref(),
        }
        .filter(|o| !o.is_empty())
        .ok_or_else(|| {
            CiError::MissingOrganisation(match target {
                CiTarget::Validation => "Validation".to_string(),
                CiTarget::Stable => "Stable".to_string(),
            })
        })?;
        Ok(format!("{}{org}/{}/_apis/build/builds", self.base_url, self.project))
    }

    async fn fetch(&self, label: String, url: String) -> Result<String, CiError> {
        self.cache
            .get_or_fetch(self.transport.as_ref(), &label, &url)
            .await
    }

    async fn find(&self, target: CiTarget, commit: &CommitId) -> Result<Option<BuildEntry>, CiError> {
        let url = format!("{}?{API_VERSION}", self.builds_url(target)?);
        let body = self.fetch(format!("azure_br_{target}"), url).await?;
        let list: BuildList = serde_json::from_str(&body).map_err(|e| payload(e.to_string()))?;

        debug!(commit = %commit, "looking for build");
        for entry in list.value {
            let sha = entry
                .source_version
                .as_deref()
                .ok_or_else(|| payload(format!("build {} has no source version", entry.id)))?;
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
        provider: "azure".to_string(),
        detail,
    }
}

#[async_trait]
impl CiProvider for AzureProvider {
    fn name(&self) -> &str {
        "azure"
    }

    async fn build(
        &self,
        target: CiTarget,
        _branch: &Branch,
        commit: &CommitId,
    ) -> Result<CiBuild, CiError> {
        Ok(match self.find(target, commit).await? {
            Some(entry) => CiBuild::new(
                entry.result.unwrap_or_else(|| "running".to_string()),
                parse_timestamp(entry.start_time.as_deref()),
            ),
            None => CiBuild::not_found(),
        })
    }

    /// Every log file of the build, concatenated in order.
    async fn log(
        &self,
        target: CiTarget,
        _branch: &Branch,
        commit: &CommitId,
    ) -> Result<String, CiError> {
        let build = self
            .find(target, commit)
            .await?
            .ok_or_else(|| CiError::BuildNotFound {
                provider: "azure".to_string(),
                commit: commit.to_string(),
            })?;
        let logs_url = format!("{}/{}/logs", self.builds_url(target)?, build.id);

        let body = self
            .fetch(
                format!("azure_log_list_{}", build.id),
                format!("{logs_url}?{API_VERSION}"),
            )
            .await?;
        let list: LogList = serde_json::from_str(&body).map_err(|e| payload(e.to_string()))?;

        let mut log = String::new();
        for (n, entry) in list.value.iter().enumerate() {
            debug!(file = n + 1, total = list.value.len(), "downloading log file");
            let text = self
                .fetch(
                    format!("azure_log_{}_{}", build.id, entry.id),
                    format!("{logs_url}/{}?{API_VERSION}", entry.id),
                )
                .await?;
            log.push_str(&text);
            if !log.ends_with('\n') {
                log.push('\n');
            }
        }
        Ok(log)
    }

    /// Only `failed` carries a useful log; `canceled` and
    /// `partiallySucceeded` do not.
    fn is_errored(&self, build: &CiBuild) -> bool {
        build.raw_state == "failed"
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}
