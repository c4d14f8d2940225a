//! Per-repository strategy resolution and the context handed to every
//! component.
//!
//! Repositories are identified by their working tree directory name. A
//! registry entry may replace the branch naming, the release strategy or the
//! CI routing; anything left unset uses the configuration-driven default.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ci::CiRouter;
use crate::config::{CiRouting, RepoConfig};
use crate::domain::Result;
use crate::naming::{BranchNaming, PatternNaming};
use crate::operator::Operator;
use crate::release::{ReleaseStrategy, TagRelease};
use crate::vcs::VersionControl;

type NamingFactory = Arc<dyn Fn(&RepoConfig) -> Result<Arc<dyn BranchNaming>> + Send + Sync>;
type ReleaseFactory = Arc<dyn Fn(&RepoConfig) -> Arc<dyn ReleaseStrategy> + Send + Sync>;

/// Overrides registered for one repository.
#[derive(Clone, Default)]
pub struct RepoStrategies {
    naming: Option<NamingFactory>,
    release: Option<ReleaseFactory>,
    ci_routing: Option<CiRouting>,
}

impl RepoStrategies {
    pub fn naming(
        mut self,
        factory: impl Fn(&RepoConfig) -> Result<Arc<dyn BranchNaming>> + Send + Sync + 'static,
    ) -> Self {
        self.naming = Some(Arc::new(factory));
        self
    }

    pub fn release(
        mut self,
        factory: impl Fn(&RepoConfig) -> Arc<dyn ReleaseStrategy> + Send + Sync + 'static,
    ) -> Self {
        self.release = Some(Arc::new(factory));
        self
    }

    pub fn ci_routing(mut self, routing: CiRouting) -> Self {
        self.ci_routing = Some(routing);
        self
    }
}

/// Strategies resolved for the current repository.
#[derive(Clone)]
pub struct ResolvedStrategies {
    pub naming: Arc<dyn BranchNaming>,
    pub release: Arc<dyn ReleaseStrategy>,
    pub ci_routing: CiRouting,
}

/// Maps repository identity to strategy overrides.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    entries: HashMap<String, RepoStrategies>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the overrides shipped with the tool.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            "hpc-testing",
            RepoStrategies::default().ci_routing(CiRouting {
                backend: "none".to_string(),
                legacy_backend: None,
                threshold: None,
            }),
        );
        registry
    }

    pub fn register(&mut self, repo: impl Into<String>, strategies: RepoStrategies) {
        self.entries.insert(repo.into(), strategies);
    }

    pub fn is_registered(&self, repo: &str) -> bool {
        self.entries.contains_key(repo)
    }

    /// Resolve the strategies for `config.repo_name`.
    pub fn resolve(&self, config: &RepoConfig) -> Result<ResolvedStrategies> {
        let entry = self.entries.get(&config.repo_name);
        if entry.is_some() {
            tracing::debug!(repo = %config.repo_name, "using registered strategies");
        }

        let naming = match entry.and_then(|e| e.naming.as_ref()) {
            Some(factory) => factory(config)?,
            None => Arc::new(PatternNaming::new(config)?) as Arc<dyn BranchNaming>,
        };
        let release = match entry.and_then(|e| e.release.as_ref()) {
            Some(factory) => factory(config),
            None => Arc::new(TagRelease::new(config.repo_name.clone(), config.sign_tags))
                as Arc<dyn ReleaseStrategy>,
        };
        let ci_routing = entry
            .and_then(|e| e.ci_routing.clone())
            .unwrap_or_else(|| config.ci.routing.clone());

        Ok(ResolvedStrategies {
            naming,
            release,
            ci_routing,
        })
    }
}

/// Everything a pipeline run needs, built once at startup.
#[derive(Clone)]
pub struct MaintainContext {
    pub vcs: Arc<dyn VersionControl>,
    pub config: RepoConfig,
    pub naming: Arc<dyn BranchNaming>,
    pub release: Arc<dyn ReleaseStrategy>,
    pub ci: CiRouter,
    pub operator: Arc<dyn Operator>,
}

impl MaintainContext {
    pub fn new(
        vcs: Arc<dyn VersionControl>,
        config: RepoConfig,
        strategies: ResolvedStrategies,
        ci: CiRouter,
        operator: Arc<dyn Operator>,
    ) -> Self {
        Self {
            vcs,
            config,
            naming: strategies.naming,
            release: strategies.release,
            ci,
            operator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BranchVersion;
    use crate::vcs::MemoryVcs;

    #[test]
    fn test_defaults_for_unknown_repo() {
        let vcs = MemoryVcs::new("rdma-core");
        let config = RepoConfig::load(&vcs).unwrap();
        let resolved = StrategyRegistry::builtin().resolve(&config).unwrap();
        assert_eq!(resolved.ci_routing, config.ci.routing);
        assert_eq!(
            resolved.naming.local_branch(&BranchVersion::new("5"), "master"),
            "dev/stable-v5/master"
        );
    }

    #[test]
    fn test_builtin_disables_ci_for_hpc_testing() {
        let vcs = MemoryVcs::new("hpc-testing");
        let config = RepoConfig::load(&vcs).unwrap();
        let registry = StrategyRegistry::builtin();
        assert!(registry.is_registered("hpc-testing"));
        assert_eq!(registry.resolve(&config).unwrap().ci_routing.backend, "none");
    }

    #[test]
    fn test_registered_release_override() {
        let vcs = MemoryVcs::new("healthd");
        let config = RepoConfig::load(&vcs).unwrap();
        let mut registry = StrategyRegistry::new();
        registry.register(
            "healthd",
            RepoStrategies::default().release(|_| Arc::new(TagRelease::new("healthd-daemon", false))),
        );
        let resolved = registry.resolve(&config).unwrap();
        let branch = crate::naming::branch_for(
            resolved.naming.as_ref(),
            &config,
            BranchVersion::new("1"),
            "master",
            crate::domain::BranchKind::Standard,
        );
        vcs.commit_on("dev/stable-v1/master", "release", "");
        vcs.tag("v1.0", "dev/stable-v1/master");
        let plan = resolved
            .release
            .plan(&vcs, &branch, &crate::release::ReleaseKind::Stable)
            .unwrap();
        assert!(plan.message.starts_with("healthd-daemon-1.1:"));
    }
}
