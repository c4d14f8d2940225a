//! CI provider abstraction and version-based routing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Branch, CiBuild, CiError, CiTarget, CommitId};

/// Injectable source of CI results.
///
/// Implementations cache remote responses for the lifetime of a run;
/// [`CiProvider::clear_cache`] drops them so watch mode sees fresh data.
#[async_trait]
pub trait CiProvider: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    /// Build of `commit` on `branch` as seen by `target`.
    async fn build(
        &self,
        target: CiTarget,
        branch: &Branch,
        commit: &CommitId,
    ) -> Result<CiBuild, CiError>;

    /// Build log of `commit` on `branch`.
    async fn log(
        &self,
        target: CiTarget,
        branch: &Branch,
        commit: &CommitId,
    ) -> Result<String, CiError>;

    /// Whether the build ended in an error worth showing the log for.
    fn is_errored(&self, build: &CiBuild) -> bool;

    fn clear_cache(&self);
}

/// Routes each branch to the backend that serves its version.
///
/// Lines older than the threshold go to the legacy backend; named lines
/// (e.g. `master`) always use the current one.
#[derive(Clone, Default)]
pub struct CiRouter {
    current: Option<Arc<dyn CiProvider>>,
    legacy: Option<(u64, Arc<dyn CiProvider>)>,
}

impl CiRouter {
    pub fn new(current: Arc<dyn CiProvider>) -> Self {
        Self {
            current: Some(current),
            legacy: None,
        }
    }

    /// No CI integration: every query reports [`CiError::NoProvider`].
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_legacy(mut self, threshold: u64, legacy: Arc<dyn CiProvider>) -> Self {
        self.legacy = Some((threshold, legacy));
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.current.is_some() || self.legacy.is_some()
    }

    pub fn provider_for(&self, branch: &Branch) -> Option<&Arc<dyn CiProvider>> {
        if let (Some((threshold, legacy)), Some(major)) = (&self.legacy, branch.version.major()) {
            if !branch.version.is_mainline() && major < *threshold {
                return Some(legacy);
            }
        }
        self.current.as_ref()
    }

    fn require(&self, branch: &Branch) -> Result<&Arc<dyn CiProvider>, CiError> {
        self.provider_for(branch)
            .ok_or_else(|| CiError::NoProvider(branch.label()))
    }

    pub async fn state(
        &self,
        target: CiTarget,
        branch: &Branch,
        commit: &CommitId,
    ) -> Result<CiBuild, CiError> {
        let provider = self.require(branch)?;
        let build = provider.build(target, branch, commit).await?;
        tracing::debug!(
            provider = provider.name(),
            %target,
            branch = %branch.local,
            commit = %commit.short(),
            state = %build.raw_state,
            "ci state"
        );
        Ok(build)
    }

    pub async fn log(
        &self,
        target: CiTarget,
        branch: &Branch,
        commit: &CommitId,
    ) -> Result<String, CiError> {
        self.require(branch)?.log(target, branch, commit).await
    }

    /// Start time of the build, `None` when no build exists yet.
    pub async fn timestamp(
        &self,
        target: CiTarget,
        branch: &Branch,
        commit: &CommitId,
    ) -> Result<Option<DateTime<Utc>>, CiError> {
        Ok(self.state(target, branch, commit).await?.started_at)
    }

    pub fn is_errored(&self, branch: &Branch, build: &CiBuild) -> bool {
        self.provider_for(branch)
            .is_some_and(|p| p.is_errored(build))
    }

    pub fn clear_caches(&self) {
        if let Some(current) = &self.current {
            current.clear_cache();
        }
        if let Some((_, legacy)) = &self.legacy {
            legacy.clear_cache();
        }
    }
}
