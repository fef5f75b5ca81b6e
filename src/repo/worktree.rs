//! Git worktree owned by the engine.
//!
//! All mutations of the clone flow through this type. Accepted changes
//! accumulate on the fixed work branch; per-request commits live on an
//! ephemeral atomic branch until they are squashed in or rolled back.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::process::{run_command, ProcessError};

/// Fixed branch where accepted, squashed changes accumulate. Shared by all
/// repositories; configurable work branches are deliberately not supported.
pub const WORK_BRANCH: &str = "levelup-work";

const GIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Typed failure for every worktree operation: which git subcommand failed,
/// with what exit code, and what it printed to stderr.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git {operation} failed (exit {status:?}): {stderr}")]
    Command {
        operation: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("git {operation} could not run: {source}")]
    Process {
        operation: String,
        #[source]
        source: ProcessError,
    },
    #[error("post-checkout command failed: {stderr}")]
    PostCheckout { stderr: String },
}

pub struct Worktree {
    url: String,
    path: PathBuf,
    git_path: String,
    post_checkout: Option<String>,
}

impl Worktree {
    /// Build a worktree for `url` under `repos_dir`. Nothing touches the
    /// filesystem until [`ensure_cloned`](Self::ensure_cloned).
    pub fn new(
        url: &str,
        repos_dir: &Path,
        git_path: &str,
        post_checkout: Option<String>,
    ) -> Self {
        let name = repo_dir_name(&repo_name_from_url(url));
        Self {
            url: url.to_string(),
            path: repos_dir.join(name),
            git_path: git_path.to_string(),
            post_checkout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn run_git(&self, args: &[&str], cwd: Option<&Path>) -> Result<String, GitError> {
        let operation = args.first().copied().unwrap_or("git").to_string();
        tracing::debug!(operation, ?args, "running git");
        let envs = [("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())];
        let out = run_command(
            &self.git_path,
            args,
            Some(cwd.unwrap_or(&self.path)),
            &envs,
            GIT_TIMEOUT,
        )
        .map_err(|source| GitError::Process {
            operation: operation.clone(),
            source,
        })?;
        if !out.success() {
            return Err(GitError::Command {
                operation,
                status: out.status_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out.stdout.trim().to_string())
    }

    /// Clone on first use; on later uses check out the default branch and
    /// pull, tolerating pull failure (offline operation keeps working).
    pub fn ensure_cloned(&self) -> Result<(), GitError> {
        if !self.path.join(".git").exists() {
            tracing::info!(url = %self.url, path = %self.path.display(), "cloning repository");
            let parent = self
                .path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let _ = std::fs::create_dir_all(&parent);
            self.run_git(
                &["clone", &self.url, &self.path.to_string_lossy()],
                Some(&parent),
            )?;
            return Ok(());
        }

        let default = self.default_branch()?;
        self.run_git(&["checkout", &default], None)?;
        if let Err(e) = self.pull() {
            tracing::warn!("pull failed, continuing with local state: {e}");
        }
        Ok(())
    }

    /// Fast-forward the current branch from its remote.
    pub fn pull(&self) -> Result<(), GitError> {
        self.run_git(&["pull", "--ff-only"], None).map(|_| ())
    }

    fn default_branch(&self) -> Result<String, GitError> {
        for candidate in ["main", "master"] {
            if self.branch_exists(candidate)? {
                return Ok(candidate.to_string());
            }
        }
        // Fall back to whatever HEAD currently names.
        self.get_current_branch()
    }

    fn branch_exists(&self, name: &str) -> Result<bool, GitError> {
        let refname = format!("refs/heads/{name}");
        match self.run_git(&["rev-parse", "--verify", "--quiet", &refname], None) {
            Ok(_) => Ok(true),
            Err(GitError::Command { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check out the work branch (creating it from the default branch if
    /// absent), reset it to a clean state, and run the configured
    /// post-checkout command. A failing post-checkout aborts the request.
    pub fn prepare_work_branch(&self) -> Result<(), GitError> {
        if self.branch_exists(WORK_BRANCH)? {
            self.run_git(&["checkout", WORK_BRANCH], None)?;
        } else {
            let default = self.default_branch()?;
            self.run_git(&["checkout", &default], None)?;
            self.run_git(&["checkout", "-b", WORK_BRANCH], None)?;
        }
        self.reset_hard("HEAD")?;
        if let Some(cmd) = &self.post_checkout {
            if !cmd.trim().is_empty() {
                tracing::info!(command = %cmd, "running post-checkout command");
                let out = run_command(
                    "sh",
                    ["-c", cmd.as_str()],
                    Some(&self.path),
                    &[],
                    GIT_TIMEOUT,
                )
                .map_err(|source| GitError::Process {
                    operation: "post-checkout".into(),
                    source,
                })?;
                if !out.success() {
                    return Err(GitError::PostCheckout {
                        stderr: out.stderr.trim().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn checkout_branch(&self, name: &str, create: bool) -> Result<(), GitError> {
        if create && !self.branch_exists(name)? {
            self.run_git(&["checkout", "-b", name], None)?;
        } else {
            self.run_git(&["checkout", name], None)?;
        }
        Ok(())
    }

    /// Create a fresh branch for per-request atomic commits, forked from
    /// `base`, and leave it checked out.
    pub fn create_atomic_branch(&self, base: &str, name: &str) -> Result<(), GitError> {
        self.run_git(&["checkout", base], None)?;
        self.run_git(&["checkout", "-b", name], None)?;
        Ok(())
    }

    pub fn delete_branch(&self, name: &str, force: bool) -> Result<(), GitError> {
        let flag = if force { "-D" } else { "-d" };
        self.run_git(&["branch", flag, name], None).map(|_| ())
    }

    /// Stage everything and commit. Returns `Ok(false)` when the tree was
    /// clean and no commit was produced.
    pub fn commit(&self, message: &str) -> Result<bool, GitError> {
        self.run_git(&["add", "-A"], None)?;
        let status = self.run_git(&["status", "--porcelain"], None)?;
        if status.is_empty() {
            tracing::debug!("no changes to commit");
            return Ok(false);
        }
        self.run_git(&["commit", "-m", message], None)?;
        Ok(true)
    }

    pub fn get_commit_hash(&self, reference: &str) -> Result<String, GitError> {
        self.run_git(&["rev-parse", reference], None)
    }

    pub fn get_current_branch(&self) -> Result<String, GitError> {
        self.run_git(&["rev-parse", "--abbrev-ref", "HEAD"], None)
    }

    /// Restore one file from HEAD, discarding working-tree edits to it.
    pub fn checkout_file(&self, file: &Path) -> Result<(), GitError> {
        self.checkout_file_at("HEAD", file)
    }

    /// Restore one file to its content at `reference`.
    pub fn checkout_file_at(&self, reference: &str, file: &Path) -> Result<(), GitError> {
        self.run_git(&["checkout", reference, "--", &file.to_string_lossy()], None)
            .map(|_| ())
    }

    /// Paths changed between two commits, repo-relative.
    pub fn changed_files(&self, from: &str, to: &str) -> Result<Vec<PathBuf>, GitError> {
        let out = self.run_git(&["diff", "--name-only", from, to], None)?;
        Ok(out
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(PathBuf::from)
            .collect())
    }

    /// Discard index and working tree back to `reference`. Rollback of a
    /// rejected commit uses `{hash}~1`.
    pub fn reset_hard(&self, reference: &str) -> Result<(), GitError> {
        self.run_git(&["reset", "--hard", reference], None)
            .map(|_| ())
    }

    pub fn cherry_pick(&self, hash: &str) -> Result<(), GitError> {
        self.run_git(&["cherry-pick", hash], None).map(|_| ())
    }

    /// Abort a conflicted cherry-pick, clearing the sequencer state.
    pub fn cherry_pick_abort(&self) -> Result<(), GitError> {
        self.run_git(&["cherry-pick", "--abort"], None).map(|_| ())
    }

    /// Collapse everything committed on `atomic` since it forked from
    /// `target` into a single commit on `target`, then drop `atomic`.
    pub fn squash_and_rebase(&self, atomic: &str, target: &str) -> Result<(), GitError> {
        let merge_base = self.run_git(&["merge-base", atomic, target], None)?;
        self.run_git(&["checkout", atomic], None)?;
        self.run_git(&["reset", "--soft", &merge_base], None)?;
        let status = self.run_git(&["status", "--porcelain"], None)?;
        if !status.is_empty() {
            let message = format!("Squashed atomic changes from {atomic}");
            self.run_git(&["commit", "-m", &message], None)?;
        }
        self.run_git(&["rebase", target], None)?;
        self.run_git(&["checkout", target], None)?;
        self.run_git(&["merge", atomic, "--ff-only"], None)?;
        self.run_git(&["branch", "-d", atomic], None)?;
        Ok(())
    }

    pub fn push(&self, branch: Option<&str>) -> Result<(), GitError> {
        let branch = branch.unwrap_or(WORK_BRANCH);
        tracing::info!(branch, "pushing to origin");
        self.run_git(&["push", "-u", "origin", branch], None)
            .map(|_| ())
    }
}

/// Last path segment of the URL, minus any trailing `/` and `.git` suffix.
pub fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    trimmed
        .rsplit('/')
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

/// Filter a repo name down to a filesystem-safe ASCII subset.
pub fn repo_dir_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || "!#()-.=[]{}~".contains(*c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_name_strips_git_suffix_and_path() {
        assert_eq!(repo_name_from_url("https://example.com/org/widget.git"), "widget");
        assert_eq!(repo_name_from_url("https://example.com/org/widget"), "widget");
        assert_eq!(repo_name_from_url("git@host:org/widget.git/"), "widget");
    }

    #[test]
    fn dir_name_keeps_only_safe_chars() {
        assert_eq!(repo_dir_name("wid get/..\\x"), "widget..x");
        assert_eq!(repo_dir_name("lib-v1.2(beta)"), "lib-v1.2(beta)");
    }
}
