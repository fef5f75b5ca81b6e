//! Shared request and result types.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::mods::Mod;

/// What a request asks the engine to do. Exactly one source, enforced by
/// the sum type: either run a builtin mod or validate a user-supplied
/// commit by cherry-picking it.
pub enum RequestSource {
    Builtin(Box<dyn Mod>),
    Commit(String),
}

pub struct ModRequest {
    pub id: Uuid,
    pub repo_url: String,
    pub repo_name: String,
    pub description: String,
    pub source: RequestSource,
}

impl ModRequest {
    pub fn builtin(repo_url: &str, repo_name: &str, description: &str, m: Box<dyn Mod>) -> Self {
        Self {
            id: Uuid::new_v4(),
            repo_url: repo_url.to_string(),
            repo_name: repo_name.to_string(),
            description: description.to_string(),
            source: RequestSource::Builtin(m),
        }
    }

    pub fn commit(repo_url: &str, repo_name: &str, description: &str, hash: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            repo_url: repo_url.to_string(),
            repo_name: repo_name.to_string(),
            description: description.to_string(),
            source: RequestSource::Commit(hash.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Queued,
    Processing,
    Success,
    Partial,
    Failed,
    Error,
}

impl ResultStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResultStatus::Success | ResultStatus::Partial | ResultStatus::Failed | ResultStatus::Error
        )
    }

    /// Status only moves forward: queued → processing → terminal.
    pub fn can_transition_to(&self, next: ResultStatus) -> bool {
        match self {
            ResultStatus::Queued => next != ResultStatus::Queued,
            ResultStatus::Processing => next.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationRecord {
    pub file: String,
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModResult {
    pub status: ResultStatus,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub accepted_commits: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected_commits: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_results: Vec<ValidationRecord>,
}

impl ModResult {
    pub fn new(status: ResultStatus, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
            timestamp: chrono::Utc::now(),
            accepted_commits: Vec::new(),
            rejected_commits: Vec::new(),
            validation_results: Vec::new(),
        }
    }

    pub fn queued() -> Self {
        Self::new(ResultStatus::Queued, "Mod queued for processing")
    }

    pub fn processing() -> Self {
        Self::new(ResultStatus::Processing, "Processing mod")
    }

    pub fn error(message: &str) -> Self {
        Self::new(ResultStatus::Error, message)
    }
}

/// Cooperative cancellation flag, checked by the engine between
/// refactorings.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
