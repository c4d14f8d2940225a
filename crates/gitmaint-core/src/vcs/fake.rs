//! In-memory [`VersionControl`] for tests.
//!
//! Models a small commit graph with branches, remote-tracking refs, tags,
//! notes and git config. Cherry-picks copy the commit under a fresh id, the
//! same way a real backport rewrites identity. Commits registered through
//! [`MemoryVcs::mark_conflict`] fail to apply and leave the tree dirty until
//! the test resolves or resets it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use super::{ApplyStatus, LogQuery, PickOptions, VcsResult, VersionControl};
use crate::domain::{Commit, CommitId, VcsError};

#[derive(Debug, Clone)]
struct Node {
    commit: Commit,
    parents: Vec<CommitId>,
    seq: u64,
}

/// A push as recorded by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRecord {
    pub remote: String,
    pub refspecs: Vec<String>,
    pub force: bool,
}

#[derive(Debug, Default)]
struct State {
    nodes: HashMap<CommitId, Node>,
    branches: BTreeMap<String, CommitId>,
    remotes: BTreeMap<String, BTreeMap<String, CommitId>>,
    tags: BTreeMap<String, CommitId>,
    tag_messages: BTreeMap<String, String>,
    remote_tags: BTreeMap<String, BTreeSet<String>>,
    notes: HashMap<(String, CommitId), String>,
    config: BTreeMap<String, String>,
    current: String,
    dirty: bool,
    pending_pick: Option<CommitId>,
    conflicts: HashSet<CommitId>,
    empty_picks: HashSet<CommitId>,
    pushes: Vec<PushRecord>,
    fetches: Vec<String>,
    picks: Vec<CommitId>,
    seq: u64,
}

impl State {
    fn new_id(&mut self) -> CommitId {
        self.seq += 1;
        let mixed = self.seq.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        CommitId::new(format!("{mixed:016x}{:024x}", self.seq))
    }

    fn add_node(&mut self, subject: &str, body: &str, parents: Vec<CommitId>) -> CommitId {
        let id = self.new_id();
        let seq = self.seq;
        self.nodes.insert(
            id.clone(),
            Node {
                commit: Commit::new(id.clone(), subject, body),
                parents,
                seq,
            },
        );
        id
    }

    fn resolve(&self, rev: &str) -> Option<CommitId> {
        if rev == "HEAD" {
            return self.branches.get(&self.current).cloned();
        }
        if let Some(tag) = rev.strip_prefix("refs/tags/") {
            return self.tags.get(tag).cloned();
        }
        let rev = rev.strip_prefix("refs/heads/").unwrap_or(rev);
        let id = CommitId::new(rev);
        if self.nodes.contains_key(&id) {
            return Some(id);
        }
        if let Some(id) = self.branches.get(rev) {
            return Some(id.clone());
        }
        if let Some(id) = self.tags.get(rev) {
            return Some(id.clone());
        }
        if let Some((remote, branch)) = rev.split_once('/') {
            if let Some(id) = self.remotes.get(remote).and_then(|r| r.get(branch)) {
                return Some(id.clone());
            }
        }
        if rev.len() >= 7 && rev.chars().all(|c| c.is_ascii_hexdigit()) {
            let mut matches = self.nodes.keys().filter(|k| k.as_str().starts_with(rev));
            if let (Some(id), None) = (matches.next(), matches.next()) {
                return Some(id.clone());
            }
        }
        None
    }

    fn require(&self, rev: &str) -> VcsResult<CommitId> {
        self.resolve(rev)
            .ok_or_else(|| VcsError::UnknownRevision(rev.to_string()))
    }

    fn ancestry(&self, tip: &CommitId) -> HashSet<CommitId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([tip.clone()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&id) {
                queue.extend(node.parents.iter().cloned());
            }
        }
        seen
    }

    fn head(&self) -> VcsResult<CommitId> {
        self.require("HEAD")
    }

    fn advance(&mut self, id: CommitId) {
        let current = self.current.clone();
        self.branches.insert(current, id);
    }

    fn copy_onto_head(&mut self, source: &CommitId, record_origin: bool) -> VcsResult<CommitId> {
        let head = self.head()?;
        let node = self
            .nodes
            .get(source)
            .cloned()
            .ok_or_else(|| VcsError::UnknownRevision(source.to_string()))?;
        let body = if record_origin {
            let sep = if node.commit.body.is_empty() { "" } else { "\n\n" };
            format!(
                "{}{sep}(cherry picked from commit {})",
                node.commit.body, source
            )
        } else {
            node.commit.body.clone()
        };
        let id = self.add_node(&node.commit.subject, &body, vec![head]);
        self.advance(id.clone());
        Ok(id)
    }
}

/// In-memory repository. All methods take `&self`; state lives behind a
/// mutex so the fake can be shared with scripted operators.
#[derive(Debug)]
pub struct MemoryVcs {
    name: String,
    state: Mutex<State>,
}

impl Default for MemoryVcs {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemoryVcs {
    /// A repository with one root commit on branch `master`.
    pub fn new(name: &str) -> Self {
        let mut state = State::default();
        let root = state.add_node("initial", "", vec![]);
        state.branches.insert("master".to_string(), root);
        state.current = "master".to_string();
        Self {
            name: name.to_string(),
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a commit to `branch` (created from `master` when absent).
    pub fn commit_on(&self, branch: &str, subject: &str, body: &str) -> CommitId {
        let mut s = self.lock();
        let parent = match s.branches.get(branch) {
            Some(id) => id.clone(),
            None => s.branches["master"].clone(),
        };
        let id = s.add_node(subject, body, vec![parent]);
        s.branches.insert(branch.to_string(), id.clone());
        id
    }

    /// Point a local branch at `rev`.
    pub fn set_branch(&self, name: &str, rev: &str) {
        let mut s = self.lock();
        if let Some(id) = s.resolve(rev) {
            s.branches.insert(name.to_string(), id);
        }
    }

    /// Point `<remote>/<branch>` at `rev`.
    pub fn set_remote_ref(&self, remote: &str, branch: &str, rev: &str) {
        let mut s = self.lock();
        if let Some(id) = s.resolve(rev) {
            s.remotes
                .entry(remote.to_string())
                .or_default()
                .insert(branch.to_string(), id);
        }
    }

    pub fn tag(&self, name: &str, rev: &str) {
        let mut s = self.lock();
        if let Some(id) = s.resolve(rev) {
            s.tags.insert(name.to_string(), id);
        }
    }

    pub fn add_remote_tag(&self, remote: &str, tag: &str) {
        self.lock()
            .remote_tags
            .entry(remote.to_string())
            .or_default()
            .insert(tag.to_string());
    }

    pub fn set_config(&self, key: &str, value: &str) {
        self.lock()
            .config
            .insert(key.to_string(), value.to_string());
    }

    /// Picks of `commit` stop with conflicting edits.
    pub fn mark_conflict(&self, commit: &CommitId) {
        self.lock().conflicts.insert(commit.clone());
    }

    /// Picks of `commit` stop without touching the tree.
    pub fn mark_empty(&self, commit: &CommitId) {
        self.lock().empty_picks.insert(commit.clone());
    }

    /// Commit the pending conflicted pick, as an operator would after fixing it.
    pub fn resolve_pending_pick(&self) -> Option<CommitId> {
        let mut s = self.lock();
        let pending = s.pending_pick.take()?;
        s.dirty = false;
        s.copy_onto_head(&pending, true).ok()
    }

    pub fn current_branch(&self) -> String {
        self.lock().current.clone()
    }

    pub fn pushes(&self) -> Vec<PushRecord> {
        self.lock().pushes.clone()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.lock().fetches.clone()
    }

    /// Every commit handed to `cherry_pick`, in order.
    pub fn picks(&self) -> Vec<CommitId> {
        self.lock().picks.clone()
    }

    pub fn tag_message(&self, name: &str) -> Option<String> {
        self.lock().tag_messages.get(name).cloned()
    }

    pub fn has_branch(&self, name: &str) -> bool {
        self.lock().branches.contains_key(name)
    }
}

impl VersionControl for MemoryVcs {
    fn repo_name(&self) -> String {
        self.name.clone()
    }

    fn resolve(&self, rev: &str) -> Option<CommitId> {
        self.lock().resolve(rev)
    }

    fn is_ancestor(&self, ancestor: &CommitId, descendant: &CommitId) -> VcsResult<bool> {
        let s = self.lock();
        Ok(s.ancestry(descendant).contains(ancestor))
    }

    fn commit(&self, rev: &str) -> VcsResult<Commit> {
        let s = self.lock();
        let id = s.require(rev)?;
        Ok(s.nodes[&id].commit.clone())
    }

    fn log(&self, query: &LogQuery) -> VcsResult<Vec<CommitId>> {
        let s = self.lock();
        let mut included = HashSet::new();
        for rev in &query.include {
            included.extend(s.ancestry(&s.require(rev)?));
        }
        for rev in &query.exclude {
            for id in s.ancestry(&s.require(rev)?) {
                included.remove(&id);
            }
        }
        let mut nodes: Vec<&Node> = included
            .iter()
            .filter_map(|id| s.nodes.get(id))
            .filter(|n| !query.no_merges || n.parents.len() <= 1)
            .filter(|n| match &query.grep {
                Some(p) => n.commit.subject.contains(p.as_str()) || n.commit.body.contains(p.as_str()),
                None => true,
            })
            .collect();
        nodes.sort_by_key(|n| std::cmp::Reverse(n.seq));
        if query.reverse {
            nodes.reverse();
        }
        Ok(nodes.into_iter().map(|n| n.commit.id.clone()).collect())
    }

    fn head(&self) -> VcsResult<CommitId> {
        self.lock().head()
    }

    fn checkout(&self, branch: &str) -> VcsResult<()> {
        let mut s = self.lock();
        if !s.branches.contains_key(branch) {
            return Err(VcsError::Command {
                command: format!("checkout -q {branch}"),
                stderr: format!("pathspec '{branch}' did not match any file(s) known to git"),
            });
        }
        s.current = branch.to_string();
        Ok(())
    }

    fn cherry_pick(&self, commit: &CommitId, opts: &PickOptions) -> VcsResult<ApplyStatus> {
        let mut s = self.lock();
        s.picks.push(commit.clone());
        if s.dirty {
            return Ok(ApplyStatus::Failed);
        }
        if s.conflicts.contains(commit) {
            s.dirty = true;
            s.pending_pick = Some(commit.clone());
            return Ok(ApplyStatus::Failed);
        }
        if s.empty_picks.contains(commit) {
            return Ok(ApplyStatus::Failed);
        }
        s.copy_onto_head(commit, opts.record_origin)?;
        Ok(ApplyStatus::Applied)
    }

    fn is_clean(&self) -> VcsResult<bool> {
        Ok(!self.lock().dirty)
    }

    fn reset_hard(&self, rev: &str) -> VcsResult<()> {
        let mut s = self.lock();
        let id = s.require(rev)?;
        s.advance(id);
        s.dirty = false;
        s.pending_pick = None;
        Ok(())
    }

    fn amend_message(&self, message: &str) -> VcsResult<()> {
        let mut s = self.lock();
        let head = s.head()?;
        let parents = s.nodes[&head].parents.clone();
        let (subject, body) = match message.split_once('\n') {
            Some((subject, body)) => (subject.to_string(), body.trim().to_string()),
            None => (message.to_string(), String::new()),
        };
        let id = s.add_node(&subject, &body, parents);
        s.advance(id);
        Ok(())
    }

    fn merge(&self, rev: &str) -> VcsResult<ApplyStatus> {
        let mut s = self.lock();
        let other = s.require(rev)?;
        let head = s.head()?;
        if s.ancestry(&head).contains(&other) {
            return Ok(ApplyStatus::Applied);
        }
        if s.conflicts.contains(&other) {
            s.dirty = true;
            return Ok(ApplyStatus::Failed);
        }
        let id = s.add_node(&format!("Merge branch '{rev}'"), "", vec![head, other]);
        s.advance(id);
        Ok(ApplyStatus::Applied)
    }

    fn rebase(&self, onto: &str) -> VcsResult<ApplyStatus> {
        let mut s = self.lock();
        let onto_id = s.require(onto)?;
        let head = s.head()?;
        let base = s.ancestry(&onto_id);
        let mut own: Vec<Node> = s
            .ancestry(&head)
            .into_iter()
            .filter(|id| !base.contains(id))
            .filter_map(|id| s.nodes.get(&id).cloned())
            .collect();
        own.sort_by_key(|n| n.seq);
        if own.iter().any(|n| s.conflicts.contains(&n.commit.id)) {
            s.dirty = true;
            return Ok(ApplyStatus::Failed);
        }
        s.advance(onto_id);
        for node in own {
            s.copy_onto_head(&node.commit.id, false)?;
        }
        Ok(ApplyStatus::Applied)
    }

    fn create_branch(&self, name: &str, start: &str) -> VcsResult<()> {
        let mut s = self.lock();
        let id = s.require(start)?;
        s.branches.insert(name.to_string(), id);
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> VcsResult<()> {
        let mut s = self.lock();
        if s.current == name {
            return Err(VcsError::Command {
                command: format!("branch -D {name}"),
                stderr: format!("cannot delete branch '{name}' checked out"),
            });
        }
        s.branches
            .remove(name)
            .map(drop)
            .ok_or_else(|| VcsError::UnknownRevision(name.to_string()))
    }

    fn local_branches(&self) -> VcsResult<Vec<String>> {
        Ok(self.lock().branches.keys().cloned().collect())
    }

    fn remote_branches(&self, remote: &str) -> VcsResult<Vec<String>> {
        Ok(self
            .lock()
            .remotes
            .get(remote)
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn set_tag(&self, name: &str, target: &CommitId) -> VcsResult<()> {
        self.lock().tags.insert(name.to_string(), target.clone());
        Ok(())
    }

    fn create_release_tag(&self, name: &str, message: &str, _sign: bool) -> VcsResult<()> {
        let mut s = self.lock();
        let head = s.head()?;
        s.tags.insert(name.to_string(), head);
        s.tag_messages.insert(name.to_string(), message.to_string());
        Ok(())
    }

    fn tags(&self, pattern: &str, merged_into: Option<&str>) -> VcsResult<Vec<String>> {
        let s = self.lock();
        let reachable = match merged_into {
            Some(rev) => Some(s.ancestry(&s.require(rev)?)),
            None => None,
        };
        Ok(s.tags
            .iter()
            .filter(|(name, _)| glob_match(pattern, name))
            .filter(|(_, id)| reachable.as_ref().is_none_or(|r| r.contains(*id)))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn remote_tags(&self, remote: &str) -> VcsResult<Vec<String>> {
        Ok(self
            .lock()
            .remote_tags
            .get(remote)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn notes_read(&self, namespace: &str, commit: &CommitId) -> VcsResult<Option<String>> {
        Ok(self
            .lock()
            .notes
            .get(&(namespace.to_string(), commit.clone()))
            .cloned())
    }

    fn notes_append(&self, namespace: &str, commit: &CommitId, text: &str) -> VcsResult<()> {
        let mut s = self.lock();
        let entry = s
            .notes
            .entry((namespace.to_string(), commit.clone()))
            .or_default();
        if !entry.is_empty() {
            entry.push_str("\n\n");
        }
        entry.push_str(text);
        Ok(())
    }

    fn fetch(&self, remote: &str) -> VcsResult<()> {
        self.lock().fetches.push(remote.to_string());
        Ok(())
    }

    fn push(&self, remote: &str, refspecs: &[String], force: bool) -> VcsResult<()> {
        let mut s = self.lock();
        for spec in refspecs {
            let (src, dst) = spec.split_once(':').unwrap_or((spec.as_str(), spec.as_str()));
            if src.is_empty() {
                if let Some(r) = s.remotes.get_mut(remote) {
                    r.remove(dst);
                }
                continue;
            }
            let id = s.require(src)?;
            if let Some(tag) = dst.strip_prefix("refs/tags/") {
                s.remote_tags
                    .entry(remote.to_string())
                    .or_default()
                    .insert(tag.to_string());
                continue;
            }
            s.remotes
                .entry(remote.to_string())
                .or_default()
                .insert(dst.to_string(), id);
        }
        s.pushes.push(PushRecord {
            remote: remote.to_string(),
            refspecs: refspecs.to_vec(),
            force,
        });
        Ok(())
    }

    fn config(&self, key: &str) -> VcsResult<Option<String>> {
        Ok(self.lock().config.get(key).cloned())
    }

    fn config_regexp(&self, pattern: &str) -> VcsResult<Vec<(String, String)>> {
        let re = regex::Regex::new(pattern).map_err(|e| VcsError::Command {
            command: format!("config --get-regexp {pattern}"),
            stderr: e.to_string(),
        })?;
        Ok(self
            .lock()
            .config
            .iter()
            .filter(|(k, _)| re.is_match(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn remote_url(&self, remote: &str) -> VcsResult<Option<String>> {
        Ok(self.lock().config.get(&format!("remote.{remote}.url")).cloned())
    }
}

/// Simple glob matcher: `*` matches any sequence of non-slash characters.
fn glob_match(pattern: &str, value: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let v: Vec<char> = value.chars().collect();

    let mut pi = 0usize;
    let mut vi = 0usize;
    let mut last_star: Option<usize> = None;
    let mut last_match_vi = 0usize;

    while vi < v.len() {
        if pi < p.len() && p[pi] == v[vi] {
            pi += 1;
            vi += 1;
            continue;
        }

        if pi < p.len() && p[pi] == '*' {
            last_star = Some(pi);
            pi += 1;
            last_match_vi = vi;
            continue;
        }

        if let Some(star_idx) = last_star {
            if v[last_match_vi] == '/' {
                return false;
            }
            last_match_vi += 1;
            vi = last_match_vi;
            pi = star_idx + 1;
            continue;
        }

        return false;
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }

    pi == p.len()
}
