//! Atomic refactorings.
//!
//! A refactoring checks its preconditions against the symbol data and the
//! file text, mutates one or more files, and commits the result. It either
//! produces a [`GitCommit`] descriptor naming the validator that must pass
//! for the commit to survive, or applies nothing at all.

pub mod commit;
pub mod prototype;
pub mod qualifier;

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::repo::Worktree;
use crate::symbols::SymbolTable;

pub use commit::GitCommit;
pub use prototype::RenameParameter;
pub use qualifier::{AddFunctionQualifier, Qualifier, RemoveFunctionQualifier};

pub trait Refactoring: Send {
    /// Human-readable description for logs.
    fn describe(&self) -> String;
    /// Primary file this refactoring mutates, as recorded in symbol data.
    fn target_file(&self) -> &Path;
    /// Validator that must pass for this change to be kept.
    fn validator_id(&self) -> &'static str;
    /// Intrinsic likelihood that the change survives validation.
    fn probability(&self) -> f64;
    /// Apply the change. `Ok(None)` means a precondition failed or the edit
    /// turned out to be a no-op; nothing was committed in that case.
    fn apply(&self, worktree: &Worktree, symbols: &mut SymbolTable) -> Result<Option<GitCommit>>;
}

/// Resolve a symbol-recorded path against the worktree root. The extractor
/// records paths however it was invoked, so both absolute and repo-relative
/// spellings show up.
pub(crate) fn resolve_in_repo(worktree: &Worktree, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        worktree.path().join(path)
    }
}
