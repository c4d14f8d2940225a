//! Repository-scoped configuration.
//!
//! Everything is read from git config through the [`VersionControl`]
//! capability, so a repository carries its own maintenance settings.

use serde::{Deserialize, Serialize};

use crate::domain::{MaintainError, Result};
use crate::vcs::VersionControl;

pub const DEFAULT_VALIDATION_REMOTE: &str = "github";
pub const DEFAULT_STABLE_REMOTE: &str = "stable";
pub const DEFAULT_UPSTREAM_REF: &str = "origin/master";
pub const DEFAULT_BRANCH_FORMAT: &str = "dev/stable-v([0-9]+)";
pub const DEFAULT_STABLE_BRANCH_FORMAT: &str = "stable-v\\1";
pub const DEFAULT_STABLE_BASE_FORMAT: &str = "v\\1";
pub const DEFAULT_TRAVIS_URL: &str = "https://api.travis-ci.org/";
pub const DEFAULT_AZURE_URL: &str = "https://dev.azure.com/";

/// Which CI backend serves which stable lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiRouting {
    /// Backend for current lines and the mainline (`travis`, `azure`, `none`).
    pub backend: String,
    /// Backend for lines older than `threshold`.
    pub legacy_backend: Option<String>,
    pub threshold: Option<u64>,
}

impl Default for CiRouting {
    fn default() -> Self {
        Self {
            backend: "travis".to_string(),
            legacy_backend: None,
            threshold: None,
        }
    }
}

/// Provider endpoints and identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiSettings {
    pub routing: CiRouting,
    pub travis_url: String,
    pub azure_url: String,
    pub azure_valid_org: Option<String>,
    pub azure_stable_org: Option<String>,
    /// `owner/repo` of the validation remote.
    pub validation_slug: Option<String>,
    /// `owner/repo` of the stable remote.
    pub stable_slug: Option<String>,
}

/// Maintenance configuration of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub repo_name: String,
    pub validation_remote: String,
    pub stable_remote: String,
    /// Upstream mainline ref that `steal` walks.
    pub upstream_ref: String,
    /// Local branch regex; capture group 1 is the version.
    pub branch_format: String,
    /// Remote stable branch template (`\1` = version).
    pub stable_branch_format: String,
    /// Stable base template (`\1` = version).
    pub stable_base_format: String,
    /// `(branch pattern, base)` overrides from `stable-base.<pattern>`.
    pub stable_base_overrides: Vec<(String, String)>,
    pub sign_tags: bool,
    pub ci: CiSettings,
    pub debug: bool,
    pub debug_ci: bool,
}

impl RepoConfig {
    /// Read the configuration from git config, falling back to defaults.
    pub fn load(vcs: &dyn VersionControl) -> Result<Self> {
        let get = |key: &str| -> Result<Option<String>> {
            Ok(vcs.config(key)?.filter(|v| !v.trim().is_empty()))
        };
        let or = |key: &str, default: &str| -> Result<String> {
            Ok(get(key)?.unwrap_or_else(|| default.to_string()))
        };

        let validation_remote = or("maintain.valid-repo", DEFAULT_VALIDATION_REMOTE)?;
        let stable_remote = or("maintain.stable-repo", DEFAULT_STABLE_REMOTE)?;

        let stable_base_overrides = vcs
            .config_regexp("^stable-base\\.")?
            .into_iter()
            .filter_map(|(key, base)| {
                key.strip_prefix("stable-base.")
                    .map(|pattern| (pattern.replace("---", "/"), base))
            })
            .collect();

        let threshold = match get("maintain.ci-threshold")? {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                MaintainError::Config(format!("maintain.ci-threshold is not a number: {raw}"))
            })?),
            None => None,
        };

        let ci = CiSettings {
            routing: CiRouting {
                backend: or("maintain.ci", "travis")?,
                legacy_backend: get("maintain.ci-legacy")?,
                threshold,
            },
            travis_url: or("maintain.travis-url", DEFAULT_TRAVIS_URL)?,
            azure_url: or("maintain.azure-url", DEFAULT_AZURE_URL)?,
            azure_valid_org: get("maintain.azure-valid-org")?,
            azure_stable_org: get("maintain.azure-stable-org")?,
            validation_slug: vcs
                .remote_url(&validation_remote)?
                .and_then(|u| remote_slug(&u)),
            stable_slug: vcs.remote_url(&stable_remote)?.and_then(|u| remote_slug(&u)),
        };

        Ok(Self {
            repo_name: vcs.repo_name(),
            upstream_ref: or("maintain.upstream-ref", DEFAULT_UPSTREAM_REF)?,
            branch_format: or("maintain.branch-format", DEFAULT_BRANCH_FORMAT)?,
            stable_branch_format: or(
                "maintain.stable-branch-format",
                DEFAULT_STABLE_BRANCH_FORMAT,
            )?,
            stable_base_format: or("maintain.stable-base-format", DEFAULT_STABLE_BASE_FORMAT)?,
            stable_base_overrides,
            sign_tags: get("maintain.sign-tags")?
                .map(|v| parse_bool(&v))
                .unwrap_or(true),
            validation_remote,
            stable_remote,
            ci,
            debug: env_flag("DEBUG"),
            debug_ci: env_flag("DEBUG_CI"),
        })
    }
}

/// A boolean-ish environment toggle: set and non-empty.
pub fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "on" | "1"
    )
}

/// `owner/repo` from a remote URL (`git@host:owner/repo.git`,
/// `https://host/owner/repo`).
pub fn remote_slug(url: &str) -> Option<String> {
    let url = url.trim().trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url);
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p)?,
        None => url.rsplit_once(':').map(|(_, p)| p).unwrap_or(url),
    };
    let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return None;
    }
    let repo = parts.pop()?;
    let owner = parts.pop()?;
    Some(format!("{owner}/{repo}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::MemoryVcs;

    #[test]
    fn test_defaults_when_unset() {
        let vcs = MemoryVcs::new("rdma-core");
        let config = RepoConfig::load(&vcs).unwrap();
        assert_eq!(config.repo_name, "rdma-core");
        assert_eq!(config.validation_remote, "github");
        assert_eq!(config.stable_remote, "stable");
        assert_eq!(config.upstream_ref, "origin/master");
        assert_eq!(config.branch_format, DEFAULT_BRANCH_FORMAT);
        assert_eq!(config.ci.routing.backend, "travis");
        assert!(config.sign_tags);
        assert!(config.stable_base_overrides.is_empty());
    }

    #[test]
    fn test_overrides_and_slugs() {
        let vcs = MemoryVcs::new("repo");
        vcs.set_config("maintain.valid-repo", "review");
        vcs.set_config("maintain.ci-threshold", "28");
        vcs.set_config("maintain.ci-legacy", "travis");
        vcs.set_config("maintain.ci", "azure");
        vcs.set_config("maintain.sign-tags", "false");
        vcs.set_config("stable-base.dev---stable-v5", "v5.0-rc1");
        vcs.set_config("remote.review.url", "git@github.com:someone/rdma-core.git");
        let config = RepoConfig::load(&vcs).unwrap();
        assert_eq!(config.validation_remote, "review");
        assert_eq!(config.ci.routing.threshold, Some(28));
        assert_eq!(config.ci.routing.legacy_backend.as_deref(), Some("travis"));
        assert_eq!(config.ci.validation_slug.as_deref(), Some("someone/rdma-core"));
        assert_eq!(config.ci.stable_slug, None);
        assert!(!config.sign_tags);
        assert_eq!(
            config.stable_base_overrides,
            vec![("dev/stable-v5".to_string(), "v5.0-rc1".to_string())]
        );
    }

    #[test]
    fn test_bad_threshold_is_config_error() {
        let vcs = MemoryVcs::new("repo");
        vcs.set_config("maintain.ci-threshold", "soon");
        let err = RepoConfig::load(&vcs).unwrap_err();
        assert!(matches!(err, MaintainError::Config(_)));
    }

    #[test]
    fn test_remote_slug_forms() {
        assert_eq!(
            remote_slug("https://github.com/linux-rdma/rdma-core.git").as_deref(),
            Some("linux-rdma/rdma-core")
        );
        assert_eq!(
            remote_slug("git@github.com:linux-rdma/rdma-core").as_deref(),
            Some("linux-rdma/rdma-core")
        );
        assert_eq!(remote_slug("origin"), None);
    }
}
