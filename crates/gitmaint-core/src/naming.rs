//! Branch naming: mapping between versions, local branches, remote stable
//! branches and stable bases.

use regex::Regex;

use crate::config::RepoConfig;
use crate::domain::{Branch, BranchKind, BranchVersion, MaintainError, Result};

/// Translates stable versions to and from branch names.
///
/// The default [`PatternNaming`] is driven by the configured formats;
/// repositories with unusual layouts register their own implementation.
pub trait BranchNaming: Send + Sync {
    /// Local branch for `version` with the given suffix.
    fn local_branch(&self, version: &BranchVersion, suffix: &str) -> String;

    /// Version encoded in a local branch name with the given suffix.
    fn parse_local(&self, name: &str, suffix: &str) -> Option<BranchVersion>;

    /// Suffix of a local branch following the naming pattern.
    fn suffix_of(&self, name: &str) -> Option<String>;

    /// Branch name on the stable remote.
    fn stable_branch(&self, version: &BranchVersion) -> String;

    /// Version encoded in a stable remote branch name.
    fn parse_stable(&self, name: &str) -> Option<BranchVersion>;

    /// Revision the stable line forked from upstream.
    fn stable_base(&self, local_branch: &str) -> Result<String>;
}

/// Regex and template driven naming.
#[derive(Debug, Clone)]
pub struct PatternNaming {
    branch_format: String,
    suffix_re: Regex,
    stable_format: String,
    stable_re: Regex,
    base_re: Regex,
    base_template: String,
    overrides: Vec<(Regex, String)>,
}

impl PatternNaming {
    pub fn new(config: &RepoConfig) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| MaintainError::Config(format!("invalid branch pattern '{pattern}': {e}")))
        };

        let overrides = config
            .stable_base_overrides
            .iter()
            .map(|(pattern, base)| {
                Ok((compile(&format!("(^|/){pattern}(/|$)"))?, base.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            suffix_re: compile(&format!("^{}/([A-Za-z0-9_.-]+)$", config.branch_format))?,
            base_re: compile(&format!("^{}(/.*)?$", config.branch_format))?,
            stable_re: compile(&template_regex(&config.stable_branch_format))?,
            branch_format: config.branch_format.clone(),
            stable_format: config.stable_branch_format.clone(),
            base_template: config.stable_base_format.replace("\\1", "${1}"),
            overrides,
        })
    }
}

impl BranchNaming for PatternNaming {
    fn local_branch(&self, version: &BranchVersion, suffix: &str) -> String {
        let prefix = substitute_first_group(&self.branch_format, version.as_str());
        format!("{}/{suffix}", prefix.replace("\\/", "/").replace("\\.", "."))
    }

    fn parse_local(&self, name: &str, suffix: &str) -> Option<BranchVersion> {
        let caps = self.suffix_re.captures(name)?;
        let found = caps.get(caps.len() - 1)?.as_str();
        if found != suffix {
            return None;
        }
        caps.get(1).map(|m| BranchVersion::new(m.as_str()))
    }

    fn suffix_of(&self, name: &str) -> Option<String> {
        let caps = self.suffix_re.captures(name)?;
        caps.get(caps.len() - 1).map(|m| m.as_str().to_string())
    }

    fn stable_branch(&self, version: &BranchVersion) -> String {
        self.stable_format.replace("\\1", version.as_str())
    }

    fn parse_stable(&self, name: &str) -> Option<BranchVersion> {
        self.stable_re
            .captures(name)
            .and_then(|c| c.get(1))
            .map(|m| BranchVersion::new(m.as_str()))
    }

    fn stable_base(&self, local_branch: &str) -> Result<String> {
        if let Some((_, base)) = self
            .overrides
            .iter()
            .find(|(re, _)| re.is_match(local_branch))
        {
            return Ok(base.clone());
        }
        if self.base_re.is_match(local_branch) {
            return Ok(self
                .base_re
                .replace(local_branch, self.base_template.as_str())
                .into_owned());
        }
        Err(MaintainError::Config(format!(
            "could not find a stable base for branch {local_branch}"
        )))
    }
}

/// Build a [`Branch`] from its version and suffix.
pub fn branch_for(
    naming: &dyn BranchNaming,
    config: &RepoConfig,
    version: BranchVersion,
    suffix: &str,
    kind: BranchKind,
) -> Branch {
    Branch {
        local: naming.local_branch(&version, suffix),
        stable_branch: naming.stable_branch(&version),
        suffix: suffix.to_string(),
        kind,
        version,
        validation_remote: config.validation_remote.clone(),
        stable_remote: config.stable_remote.clone(),
    }
}

/// Replace the first capture group of `pattern` with `value`.
fn substitute_first_group(pattern: &str, value: &str) -> String {
    let bytes = pattern.as_bytes();
    let mut start = None;
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'(' => {
                if start.is_none() {
                    start = Some(i);
                }
                depth += 1;
            }
            b')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return format!("{}{value}{}", &pattern[..s], &pattern[i + 1..]);
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    pattern.to_string()
}

/// Anchored regex for a `\1` template, capturing the version.
fn template_regex(template: &str) -> String {
    let parts: Vec<String> = template.split("\\1").map(regex::escape).collect();
    format!("^{}$", parts.join("([0-9][0-9.]*)"))
}
