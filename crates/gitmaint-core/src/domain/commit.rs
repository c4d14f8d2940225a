//! Commit identity and message trailers.

use serde::{Deserialize, Serialize};

/// Opaque content-addressed commit identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        CommitId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CommitId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A `stable@` annotation found in a commit message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableMarker {
    /// Baseline tag the fix applies from (`# v5.4+` or `stable@v5.4`).
    /// `None` means every maintained stable line.
    pub tag: Option<String>,
}

/// A commit with its message split into subject and body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub subject: String,
    pub body: String,
}

impl Commit {
    pub fn new(id: CommitId, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// `<short-id> <subject>`, as printed in range listings.
    pub fn headline(&self) -> String {
        format!("{} {}", self.id.short(), self.subject)
    }

    /// The first `Fixes: <id>` reference in the body.
    pub fn fixes(&self) -> Option<CommitId> {
        self.body.lines().find_map(|line| {
            let line = line.trim();
            let (key, rest) = line.split_once(':')?;
            if !key.trim().eq_ignore_ascii_case("fixes") {
                return None;
            }
            let token = rest.split_whitespace().next()?;
            (token.len() >= 7 && token.chars().all(|c| c.is_ascii_hexdigit()))
                .then(|| CommitId::new(token.to_ascii_lowercase()))
        })
    }

    /// The first `stable@` annotation in the body.
    pub fn stable_marker(&self) -> Option<StableMarker> {
        self.body.lines().find_map(|line| {
            let lower = line.to_ascii_lowercase();
            let at = lower.find("stable@")?;
            let tag = match line.split_once('#') {
                Some((_, comment)) => comment
                    .split_whitespace()
                    .next()
                    .map(|t| t.trim_end_matches(['+', ',', ';']).to_string()),
                None => line[at + "stable@".len()..]
                    .split(|c: char| c.is_whitespace() || c == '>')
                    .next()
                    .filter(|t| looks_like_version_tag(t))
                    .map(str::to_string),
            };
            Some(StableMarker {
                tag: tag.filter(|t| !t.is_empty()),
            })
        })
    }
}

fn looks_like_version_tag(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('v'), Some(d)) if d.is_ascii_digit()
    )
}
