//! [`VersionControl`] backed by the `git` binary.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::debug;

use super::{ApplyStatus, LogQuery, PickOptions, VcsResult, VersionControl};
use crate::domain::{Commit, CommitId, VcsError};

/// Runs git commands inside one working tree.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
}

impl GitCli {
    /// Open the repository containing `dir`.
    pub fn open(dir: &Path) -> VcsResult<Self> {
        if !is_git_repo(dir) {
            return Err(VcsError::Command {
                command: "rev-parse --is-inside-work-tree".to_string(),
                stderr: format!("{} is not a git work tree", dir.display()),
            });
        }
        let cli = Self {
            workdir: dir.to_path_buf(),
        };
        let top = cli.run(&["rev-parse", "--show-toplevel"])?;
        Ok(Self {
            workdir: PathBuf::from(top),
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn output(&self, args: &[&str], input: Option<&str>) -> VcsResult<Output> {
        debug!(command = %args.join(" "), "running git");
        let mut child = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let (Some(text), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(text.as_bytes())?;
        }
        Ok(child.wait_with_output()?)
    }

    /// Run and return trimmed stdout, failing on a non-zero exit.
    fn run(&self, args: &[&str]) -> VcsResult<String> {
        self.run_with_input(args, None)
    }

    fn run_with_input(&self, args: &[&str], input: Option<&str>) -> VcsResult<String> {
        let output = self.output(args, input)?;
        if !output.status.success() {
            return Err(VcsError::Command {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run and return stdout on success, `None` on a non-zero exit.
    fn try_run(&self, args: &[&str]) -> VcsResult<Option<String>> {
        let output = self.output(args, None)?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }

    fn succeeds(&self, args: &[&str]) -> VcsResult<ApplyStatus> {
        let output = self.output(args, None)?;
        Ok(if output.status.success() {
            ApplyStatus::Applied
        } else {
            debug!(
                command = %args.join(" "),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "git command did not apply"
            );
            ApplyStatus::Failed
        })
    }

    fn lines(text: String) -> Vec<String> {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl VersionControl for GitCli {
    fn repo_name(&self) -> String {
        self.workdir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    fn resolve(&self, rev: &str) -> Option<CommitId> {
        let spec = format!("{rev}^{{commit}}");
        self.try_run(&["rev-parse", "--verify", "--quiet", &spec])
            .ok()
            .flatten()
            .filter(|sha| !sha.is_empty())
            .map(CommitId::new)
    }

    fn is_ancestor(&self, ancestor: &CommitId, descendant: &CommitId) -> VcsResult<bool> {
        let args = [
            "merge-base",
            "--is-ancestor",
            ancestor.as_str(),
            descendant.as_str(),
        ];
        let output = self.output(&args, None)?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(VcsError::Command {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    fn commit(&self, rev: &str) -> VcsResult<Commit> {
        let out = self
            .try_run(&["log", "-1", "--format=%H%x00%s%x00%b", rev, "--"])?
            .ok_or_else(|| VcsError::UnknownRevision(rev.to_string()))?;
        let mut parts = out.splitn(3, '\0');
        let id = parts.next().unwrap_or_default();
        if id.is_empty() {
            return Err(VcsError::UnknownRevision(rev.to_string()));
        }
        let subject = parts.next().unwrap_or_default();
        let body = parts.next().unwrap_or_default();
        Ok(Commit::new(CommitId::new(id), subject, body.trim()))
    }

    fn log(&self, query: &LogQuery) -> VcsResult<Vec<CommitId>> {
        let mut args: Vec<String> = vec!["log".to_string(), "--format=%H".to_string()];
        if query.no_merges {
            args.push("--no-merges".to_string());
        }
        if query.reverse {
            args.push("--reverse".to_string());
        }
        if let Some(pattern) = &query.grep {
            args.push("-F".to_string());
            args.push(format!("--grep={pattern}"));
        }
        args.extend(query.include.iter().cloned());
        args.extend(query.exclude.iter().map(|r| format!("^{r}")));
        args.push("--".to_string());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        Ok(Self::lines(self.run(&args)?)
            .into_iter()
            .map(CommitId::new)
            .collect())
    }

    fn head(&self) -> VcsResult<CommitId> {
        self.resolve("HEAD")
            .ok_or_else(|| VcsError::UnknownRevision("HEAD".to_string()))
    }

    fn checkout(&self, branch: &str) -> VcsResult<()> {
        self.run(&["checkout", "-q", branch]).map(drop)
    }

    fn cherry_pick(&self, commit: &CommitId, opts: &PickOptions) -> VcsResult<ApplyStatus> {
        let mut args: Vec<String> = vec!["cherry-pick".to_string()];
        if let Some(option) = &opts.strategy_option {
            args.push("--strategy=recursive".to_string());
            args.push(format!("-X{option}"));
        }
        if opts.record_origin {
            args.push("-x".to_string());
        }
        args.push(commit.to_string());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.succeeds(&args)
    }

    fn is_clean(&self) -> VcsResult<bool> {
        Ok(self.run(&["status", "-uno", "--porcelain"])?.is_empty())
    }

    fn reset_hard(&self, rev: &str) -> VcsResult<()> {
        self.run(&["reset", "-q", "--hard", rev]).map(drop)
    }

    fn amend_message(&self, message: &str) -> VcsResult<()> {
        self.run_with_input(
            &["commit", "-q", "--amend", "--signoff", "--allow-empty", "-F", "-"],
            Some(message),
        )
        .map(drop)
    }

    fn merge(&self, rev: &str) -> VcsResult<ApplyStatus> {
        self.succeeds(&["merge", "--no-edit", rev])
    }

    fn rebase(&self, onto: &str) -> VcsResult<ApplyStatus> {
        self.succeeds(&["rebase", "-q", onto])
    }

    fn create_branch(&self, name: &str, start: &str) -> VcsResult<()> {
        self.run(&["branch", name, start]).map(drop)
    }

    fn delete_branch(&self, name: &str) -> VcsResult<()> {
        self.run(&["branch", "-D", name]).map(drop)
    }

    fn local_branches(&self) -> VcsResult<Vec<String>> {
        Ok(Self::lines(self.run(&[
            "for-each-ref",
            "--format=%(refname:short)",
            "refs/heads/",
        ])?))
    }

    fn remote_branches(&self, remote: &str) -> VcsResult<Vec<String>> {
        let prefix = format!("refs/remotes/{remote}/");
        Ok(Self::lines(self.run(&[
            "for-each-ref",
            "--format=%(refname:lstrip=3)",
            &prefix,
        ])?)
        .into_iter()
        .filter(|b| b != "HEAD")
        .collect())
    }

    fn set_tag(&self, name: &str, target: &CommitId) -> VcsResult<()> {
        self.run(&["tag", "-f", name, target.as_str()]).map(drop)
    }

    fn create_release_tag(&self, name: &str, message: &str, sign: bool) -> VcsResult<()> {
        let kind = if sign { "-s" } else { "-a" };
        self.run_with_input(&["tag", kind, name, "-F", "-"], Some(message))
            .map(drop)
    }

    fn tags(&self, pattern: &str, merged_into: Option<&str>) -> VcsResult<Vec<String>> {
        let mut args = vec!["tag", "--list", pattern];
        if let Some(rev) = merged_into {
            args.push("--merged");
            args.push(rev);
        }
        Ok(Self::lines(self.run(&args)?))
    }

    fn remote_tags(&self, remote: &str) -> VcsResult<Vec<String>> {
        let out = self.run(&["ls-remote", "--tags", remote])?;
        Ok(out
            .lines()
            .filter_map(|l| l.split('\t').nth(1))
            .filter_map(|r| r.strip_prefix("refs/tags/"))
            .filter(|t| !t.ends_with("^{}"))
            .map(str::to_string)
            .collect())
    }

    fn notes_read(&self, namespace: &str, commit: &CommitId) -> VcsResult<Option<String>> {
        let ns = format!("--ref={namespace}");
        self.try_run(&["notes", &ns, "show", commit.as_str()])
    }

    fn notes_append(&self, namespace: &str, commit: &CommitId, text: &str) -> VcsResult<()> {
        let ns = format!("--ref={namespace}");
        self.run(&["notes", &ns, "append", "-m", text, commit.as_str()])
            .map(drop)
    }

    fn fetch(&self, remote: &str) -> VcsResult<()> {
        self.run(&["fetch", "-q", remote]).map(drop)
    }

    fn push(&self, remote: &str, refspecs: &[String], force: bool) -> VcsResult<()> {
        let mut args = vec!["push"];
        if force {
            args.push("-f");
        }
        args.push(remote);
        args.extend(refspecs.iter().map(String::as_str));
        self.run(&args).map(drop)
    }

    fn config(&self, key: &str) -> VcsResult<Option<String>> {
        self.try_run(&["config", "--get", key])
    }

    fn config_regexp(&self, pattern: &str) -> VcsResult<Vec<(String, String)>> {
        let out = self
            .try_run(&["config", "--get-regexp", pattern])?
            .unwrap_or_default();
        Ok(out
            .lines()
            .filter_map(|l| l.split_once(' '))
            .map(|(k, v)| (k.to_string(), v.trim().to_string()))
            .collect())
    }

    fn remote_url(&self, remote: &str) -> VcsResult<Option<String>> {
        self.try_run(&["remote", "get-url", remote])
    }
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
