//! Commit descriptor produced by a successful refactoring.

use anyhow::{bail, Result};

use crate::repo::Worktree;

/// A single atomic commit on the current (atomic) branch, together with
/// everything the engine needs to validate it or roll it back. The
/// descriptor's lifetime ends at squash or rollback.
#[derive(Debug, Clone)]
pub struct GitCommit {
    pub message: String,
    pub hash: String,
    /// Validator the engine must run before keeping this commit.
    pub validator_id: String,
    pub affected_symbols: Vec<String>,
    pub probability: f64,
}

impl GitCommit {
    /// Stage and commit the working tree. Fails when the tree is clean:
    /// a descriptor without a commit behind it would be unrollbackable.
    pub fn create(
        worktree: &Worktree,
        message: &str,
        validator_id: &str,
        affected_symbols: Vec<String>,
        probability: f64,
    ) -> Result<Self> {
        if !worktree.commit(message)? {
            bail!("nothing to commit: {message}");
        }
        let hash = worktree.get_commit_hash("HEAD")?;
        tracing::debug!(%hash, message, "created atomic commit");
        Ok(Self {
            message: message.to_string(),
            hash,
            validator_id: validator_id.to_string(),
            affected_symbols,
            probability,
        })
    }

    /// Reset the branch to this commit's parent, discarding it.
    pub fn rollback(&self, worktree: &Worktree) -> Result<()> {
        tracing::debug!(hash = %self.hash, "rolling back rejected commit");
        worktree.reset_hard(&format!("{}~1", self.hash))?;
        Ok(())
    }
}
