//! The refactoring engine.
//!
//! Processes one request at a time: prepare the worktree, load symbol
//! data, apply each planned refactoring as its own commit on an ephemeral
//! atomic branch, validate it by comparing compiler output before and
//! after, keep or roll back, and finally squash the survivors onto the
//! work branch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::compiler::Compiler;
use crate::model::{CancelFlag, ModRequest, ModResult, RequestSource, ResultStatus, ValidationRecord};
use crate::queue::RequestProcessor;
use crate::refactor::{resolve_in_repo, GitCommit, Refactoring};
use crate::repo::{RepoCatalog, Worktree, WORK_BRANCH};
use crate::symbols::{DoxygenRunner, SymbolTable};
use crate::validate::validator_from_id;

/// Translation-unit extensions that trigger compilation during commit
/// validation.
const TU_EXTENSIONS: [&str; 4] = ["c", "cc", "cpp", "cxx"];

/// Consecutive refactorings whose joint success probability stays at or
/// above this are applied together and validated with one compile pair per
/// affected file. On failure the batch is bisected, so the accepted set is
/// the same as one-at-a-time processing, only cheaper.
const BATCH_PROBABILITY_THRESHOLD: f64 = 0.8;
const MAX_BATCH_SIZE: usize = 8;

pub struct ModProcessor {
    repos_dir: PathBuf,
    git_path: String,
    doxygen_path: String,
    compiler: Arc<dyn Compiler>,
    catalog: RepoCatalog,
}

/// Running tallies for one request. Failures that can be localized to one
/// refactoring are recorded here; anything that escapes aborts the whole
/// request.
#[derive(Default)]
struct LoopState {
    accepted: Vec<String>,
    rejected: Vec<String>,
    records: Vec<ValidationRecord>,
    cancelled: bool,
}

impl ModProcessor {
    pub fn new(
        workspace: &Path,
        git_path: &str,
        doxygen_path: &str,
        compiler: Arc<dyn Compiler>,
    ) -> Self {
        Self {
            repos_dir: workspace.join("repos"),
            git_path: git_path.to_string(),
            doxygen_path: doxygen_path.to_string(),
            compiler,
            catalog: RepoCatalog::new(workspace),
        }
    }

    /// Process a request to completion. Never panics the worker: any error
    /// that escapes the refactoring loop becomes a `status: error` result
    /// after best-effort cleanup of the atomic branch.
    pub fn process_request(&self, request: &ModRequest, cancel: &CancelFlag) -> ModResult {
        tracing::info!(id = %request.id, repo = %request.repo_name, "processing request");

        let worktree = self.build_worktree(&request.repo_url);
        let atomic_branch = format!("{WORK_BRANCH}-atomic-{}", request.id);

        match self.try_process(request, &worktree, &atomic_branch, cancel) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(id = %request.id, "request failed: {e:#}");
                // Leave the repository on the work branch with the atomic
                // branch gone; ignore cleanup failures on an already
                // broken worktree.
                let _ = worktree.checkout_branch(WORK_BRANCH, false);
                let _ = worktree.reset_hard("HEAD");
                let _ = worktree.delete_branch(&atomic_branch, true);
                ModResult::error(&format!("{e:#}"))
            }
        }
    }

    fn build_worktree(&self, repo_url: &str) -> Worktree {
        let post_checkout = self
            .catalog
            .load()
            .ok()
            .and_then(|configs| {
                configs
                    .into_iter()
                    .find(|c| c.url == repo_url)
                    .and_then(|c| c.post_checkout)
            });
        Worktree::new(repo_url, &self.repos_dir, &self.git_path, post_checkout)
    }

    fn try_process(
        &self,
        request: &ModRequest,
        worktree: &Worktree,
        atomic_branch: &str,
        cancel: &CancelFlag,
    ) -> Result<ModResult> {
        worktree.ensure_cloned()?;
        worktree.prepare_work_branch()?;

        let mut symbols = SymbolTable::new(
            worktree.path(),
            Box::new(DoxygenRunner::new(&self.doxygen_path)),
        );
        symbols.load()?;

        worktree.create_atomic_branch(WORK_BRANCH, atomic_branch)?;

        let state = match &request.source {
            RequestSource::Builtin(mod_instance) => {
                let plan = mod_instance.plan(&mut symbols)?;
                tracing::info!(count = plan.len(), mod_id = mod_instance.id(), "applying plan");
                self.run_refactorings(worktree, &mut symbols, plan, cancel)?
            }
            RequestSource::Commit(hash) => self.run_cherry_pick(worktree, hash)?,
        };

        // Squash survivors onto the work branch, or drop the empty branch.
        if !state.accepted.is_empty() {
            tracing::info!(count = state.accepted.len(), "squashing accepted commits");
            worktree.squash_and_rebase(atomic_branch, WORK_BRANCH)?;
            worktree.push(Some(WORK_BRANCH))?;
        } else {
            worktree.checkout_branch(WORK_BRANCH, false)?;
            worktree.delete_branch(atomic_branch, true)?;
        }

        let status = match (state.accepted.is_empty(), state.rejected.is_empty()) {
            (false, true) if state.cancelled => ResultStatus::Partial,
            (false, true) => ResultStatus::Success,
            (false, false) => ResultStatus::Partial,
            (true, _) => ResultStatus::Failed,
        };
        let message = if state.cancelled {
            format!("{} (cancelled)", request.description)
        } else {
            request.description.clone()
        };

        let mut result = ModResult::new(status, &message);
        result.accepted_commits = state.accepted;
        result.rejected_commits = state.rejected;
        result.validation_results = state.records;
        Ok(result)
    }

    /// The BUILTIN loop: each refactoring becomes its own commit, validated
    /// against the pre-change baseline and kept or rolled back. Consecutive
    /// high-probability refactorings sharing a validator are batched so one
    /// compile pair per affected file covers all of them.
    fn run_refactorings(
        &self,
        worktree: &Worktree,
        symbols: &mut SymbolTable,
        plan: Vec<Box<dyn Refactoring>>,
        cancel: &CancelFlag,
    ) -> Result<LoopState> {
        let mut state = LoopState::default();
        let mut queue: std::collections::VecDeque<Box<dyn Refactoring>> =
            plan.into_iter().collect();

        while !queue.is_empty() {
            if cancel.is_cancelled() {
                tracing::info!("cancellation requested, finalizing early");
                state.cancelled = true;
                break;
            }
            let batch = Self::take_batch(&mut queue);
            self.process_batch(worktree, symbols, batch, &mut state)?;
        }

        Ok(state)
    }

    /// Pop the next batch: always the head refactoring, extended while the
    /// joint probability stays at or above the threshold and the declared
    /// validator stays the same.
    fn take_batch(
        queue: &mut std::collections::VecDeque<Box<dyn Refactoring>>,
    ) -> Vec<Box<dyn Refactoring>> {
        let first = queue.pop_front().expect("caller checked non-empty");
        let validator_id = first.validator_id();
        let mut product = first.probability();
        let mut batch = vec![first];

        while batch.len() < MAX_BATCH_SIZE {
            let Some(next) = queue.front() else { break };
            if next.validator_id() != validator_id {
                break;
            }
            let joint = product * next.probability();
            if joint < BATCH_PROBABILITY_THRESHOLD {
                break;
            }
            product = joint;
            batch.push(queue.pop_front().expect("front was just checked"));
        }

        if batch.len() > 1 {
            tracing::debug!(size = batch.len(), joint_probability = product, "batched refactorings");
        }
        batch
    }

    /// Apply a batch as individual commits, then validate each affected
    /// file once. On failure, unwind every batch commit and bisect; a batch
    /// that is down to one applied commit is rejected outright. The set of
    /// accepted refactorings is identical to unbatched processing.
    fn process_batch(
        &self,
        worktree: &Worktree,
        symbols: &mut SymbolTable,
        mut batch: Vec<Box<dyn Refactoring>>,
        state: &mut LoopState,
    ) -> Result<()> {
        let start_hash = worktree.get_commit_hash("HEAD")?;

        // Snapshot each target before the first edit touches it; the
        // baseline compile needs pre-batch content.
        let mut snapshots: Vec<(PathBuf, Vec<u8>)> = Vec::new();
        let mut applied: Vec<(GitCommit, PathBuf)> = Vec::new();

        for refactoring in &batch {
            let file = resolve_in_repo(worktree, refactoring.target_file());
            if !snapshots.iter().any(|(path, _)| *path == file) {
                match std::fs::read(&file) {
                    Ok(content) => snapshots.push((file.clone(), content)),
                    Err(e) => {
                        tracing::debug!("skipping {}: {e}", refactoring.describe());
                        continue;
                    }
                }
            }
            match refactoring.apply(worktree, symbols)? {
                Some(commit) => applied.push((commit, file)),
                None => tracing::debug!("skipped: {}", refactoring.describe()),
            }
        }

        if applied.is_empty() {
            return Ok(());
        }

        let validator = validator_from_id(&applied[0].0.validator_id)?;
        let level = validator.optimization_level();

        // One compile pair per distinct affected file.
        let mut file_results: Vec<(PathBuf, bool)> = Vec::new();
        let mut all_valid = true;
        for (file, baseline_content) in &snapshots {
            if !applied.iter().any(|(_, applied_file)| applied_file == file) {
                continue;
            }
            std::fs::write(file, baseline_content)
                .with_context(|| format!("failed to restore {}", file.display()))?;
            let baseline = self.compiler.compile_file(file, level);
            // Restore the committed content from git before judging.
            worktree.checkout_file(file)?;
            let candidate = self.compiler.compile_file(file, level);

            let valid = match (baseline, candidate) {
                (Ok(b), Ok(c)) => validator.validate(&b, &c),
                (b, c) => {
                    if let Err(e) = b.and(c) {
                        tracing::warn!("compile failed to run, rejecting: {e:#}");
                    }
                    false
                }
            };
            file_results.push((file.clone(), valid));
            all_valid &= valid;
        }

        if all_valid {
            for (commit, _) in applied {
                tracing::info!("accepted: {}", commit.message);
                state.accepted.push(commit.message);
            }
            for (file, _) in file_results {
                state.records.push(ValidationRecord {
                    file: file.display().to_string(),
                    valid: true,
                });
            }
            return Ok(());
        }

        // Unwind the whole batch; everything it touched is stale.
        worktree.reset_hard(&start_hash)?;
        for refactoring in &batch {
            symbols.invalidate_file(refactoring.target_file());
        }

        if applied.len() == 1 {
            let (commit, file) = applied.into_iter().next().expect("one applied commit");
            tracing::info!("rejected: {}", commit.message);
            state.rejected.push(commit.message);
            state.records.push(ValidationRecord {
                file: file.display().to_string(),
                valid: false,
            });
            return Ok(());
        }

        // Bisect: retry each half from the clean state.
        tracing::debug!(size = batch.len(), "batch failed validation, bisecting");
        let second_half = batch.split_off(batch.len() / 2);
        self.process_batch(worktree, symbols, batch, state)?;
        self.process_batch(worktree, symbols, second_half, state)?;
        Ok(())
    }

    /// The COMMIT path: cherry-pick a user-supplied commit onto the atomic
    /// branch and validate every changed translation unit at O0, as if the
    /// pick were a single accepted refactoring.
    fn run_cherry_pick(&self, worktree: &Worktree, hash: &str) -> Result<LoopState> {
        let mut state = LoopState::default();
        let message = format!("Cherry-pick {hash}");
        let base = worktree.get_commit_hash("HEAD")?;

        if let Err(e) = worktree.cherry_pick(hash) {
            tracing::warn!("cherry-pick failed: {e}");
            let _ = worktree.cherry_pick_abort();
            worktree.reset_hard("HEAD")?;
            state.rejected.push(message);
            return Ok(state);
        }
        let picked = worktree.get_commit_hash("HEAD")?;

        let validator = validator_from_id(crate::validate::ASM_O0)?;
        let level = validator.optimization_level();

        let changed: Vec<PathBuf> = worktree
            .changed_files(&base, &picked)?
            .into_iter()
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| TU_EXTENSIONS.contains(&e))
            })
            .collect();

        let mut all_valid = true;
        for relative in &changed {
            let file = worktree.path().join(relative);

            worktree.checkout_file_at(&base, relative)?;
            let baseline = self.compiler.compile_file(&file, level);
            worktree.checkout_file_at(&picked, relative)?;
            let candidate = self.compiler.compile_file(&file, level);

            let valid = match (baseline, candidate) {
                (Ok(b), Ok(c)) => validator.validate(&b, &c),
                (b, c) => {
                    if let Err(e) = b.and(c) {
                        tracing::warn!("compile failed during commit validation: {e:#}");
                    }
                    false
                }
            };
            state.records.push(ValidationRecord {
                file: relative.display().to_string(),
                valid,
            });
            all_valid &= valid;
        }

        if all_valid {
            state.accepted.push(message);
        } else {
            worktree.reset_hard(&base)?;
            state.rejected.push(message);
        }
        Ok(state)
    }
}

impl RequestProcessor for ModProcessor {
    fn process(&self, request: &ModRequest, cancel: &CancelFlag) -> ModResult {
        self.process_request(request, cancel)
    }
}
