//! API request handlers

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compiler::available_compilers;
use crate::model::{ModRequest, ModResult};
use crate::mods::{available_mods, mod_from_id};
use crate::queue::{RequestQueue, ResultStore};
use crate::repo::catalog::RepoConfigUpdate;
use crate::repo::{RepoCatalog, RepoConfig, Worktree};
use crate::symbols::{DoxygenRunner, Symbol, SymbolExtractor, SymbolTable};
use crate::validate::available_validators;
use crate::Config;

/// Shared server state
pub struct ServerState {
    pub config: Arc<Config>,
    pub catalog: RepoCatalog,
    pub queue: Arc<RequestQueue>,
    pub results: Arc<ResultStore>,
    /// Per-repo symbol generation status, keyed by catalogue id.
    pub doxygen_status: Mutex<HashMap<Uuid, DoxygenStatus>>,
}

pub type SharedState = Arc<ServerState>;

#[derive(Debug, Clone, Serialize)]
pub struct DoxygenStatus {
    pub status: String,
    pub message: String,
}

// ============================================================================
// Health check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Repository catalogue
// ============================================================================

pub async fn list_repos(
    State(state): State<SharedState>,
) -> Result<Json<Vec<RepoConfig>>, AppError> {
    let repos = state.catalog.load()?;
    Ok(Json(repos))
}

#[derive(Deserialize)]
pub struct CreateRepoRequest {
    pub url: String,
    #[serde(default)]
    pub post_checkout: Option<String>,
    #[serde(default)]
    pub build_command: Option<String>,
    #[serde(default)]
    pub single_tu_command: Option<String>,
}

pub async fn create_repo(
    State(state): State<SharedState>,
    Json(req): Json<CreateRepoRequest>,
) -> Result<Json<RepoConfig>, AppError> {
    if req.url.trim().is_empty() {
        return Err(AppError::BadRequest("url is required".into()));
    }
    let config = state.catalog.create(
        &req.url,
        RepoConfigUpdate {
            url: None,
            post_checkout: req.post_checkout,
            build_command: req.build_command,
            single_tu_command: req.single_tu_command,
        },
    )?;

    // Kick off symbol generation in the background so the first mod
    // request doesn't pay for it.
    spawn_doxygen_generation(state.clone(), config.clone());

    Ok(Json(config))
}

pub async fn update_repo(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(fields): Json<RepoConfigUpdate>,
) -> Result<Json<RepoConfig>, AppError> {
    let updated = state
        .catalog
        .update(id, fields)?
        .ok_or(AppError::NotFound("Repository not found".into()))?;
    Ok(Json(updated))
}

pub async fn delete_repo(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.catalog.delete(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Repository not found".into()))
    }
}

// ============================================================================
// Symbol data
// ============================================================================

fn spawn_doxygen_generation(state: SharedState, config: RepoConfig) {
    state.doxygen_status.lock().expect("status poisoned").insert(
        config.id,
        DoxygenStatus {
            status: "running".into(),
            message: format!("Generating symbol data for {}", config.name),
        },
    );

    std::thread::spawn(move || {
        let runner = DoxygenRunner::new(&state.config.doxygen_path);
        if !runner.is_available() {
            state.doxygen_status.lock().expect("status poisoned").insert(
                config.id,
                DoxygenStatus {
                    status: "skipped".into(),
                    message: "doxygen not found on this system".into(),
                },
            );
            tracing::warn!(repo = %config.name, "doxygen unavailable, skipping generation");
            return;
        }

        let worktree = Worktree::new(
            &config.url,
            &state.config.repos_dir(),
            &state.config.git_path,
            config.post_checkout.clone(),
        );
        let outcome = worktree
            .ensure_cloned()
            .map_err(anyhow::Error::from)
            .and_then(|_| runner.generate(worktree.path()));

        let status = match outcome {
            Ok(xml_dir) => {
                tracing::info!(repo = %config.name, "symbol data generated");
                DoxygenStatus {
                    status: "completed".into(),
                    message: format!("Symbol data generated at {}", xml_dir.display()),
                }
            }
            Err(e) => {
                tracing::warn!(repo = %config.name, "symbol generation failed: {e:#}");
                DoxygenStatus {
                    status: "failed".into(),
                    message: format!("Symbol generation failed: {e:#}"),
                }
            }
        };
        state
            .doxygen_status
            .lock()
            .expect("status poisoned")
            .insert(config.id, status);
    });
}

pub async fn regenerate_doxygen(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let config = state
        .catalog
        .get(id)?
        .ok_or(AppError::NotFound("Repository not found".into()))?;
    let name = config.name.clone();
    spawn_doxygen_generation(state.clone(), config);
    Ok(Json(serde_json::json!({
        "status": "started",
        "message": format!("Symbol generation started for {name}"),
    })))
}

pub async fn get_doxygen_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DoxygenStatus>, AppError> {
    if let Some(status) = state
        .doxygen_status
        .lock()
        .expect("status poisoned")
        .get(&id)
    {
        return Ok(Json(status.clone()));
    }

    // No generation ran this session; report whether data already exists.
    let config = state
        .catalog
        .get(id)?
        .ok_or(AppError::NotFound("Repository not found".into()))?;
    let worktree = Worktree::new(
        &config.url,
        &state.config.repos_dir(),
        &state.config.git_path,
        None,
    );
    let xml_exists = worktree
        .path()
        .join(crate::symbols::doxygen::XML_SUBDIR)
        .join("index.xml")
        .exists();
    Ok(Json(if xml_exists {
        DoxygenStatus {
            status: "completed".into(),
            message: "Symbol data available".into(),
        }
    } else {
        DoxygenStatus {
            status: "not_generated".into(),
            message: "Symbol data has not been generated for this repository".into(),
        }
    }))
}

#[derive(Deserialize)]
pub struct SymbolQuery {
    pub kind: Option<String>,
    pub file: Option<String>,
    pub name: Option<String>,
}

/// Load the symbol table for a configured repository. Loading parses the
/// full XML tree, which is blocking filesystem work.
async fn load_symbol_table(state: &SharedState, id: Uuid) -> Result<SymbolTable, AppError> {
    let config = state
        .catalog
        .get(id)?
        .ok_or(AppError::NotFound("Repository not found".into()))?;

    let repo_path = Worktree::new(
        &config.url,
        &state.config.repos_dir(),
        &state.config.git_path,
        None,
    )
    .path()
    .to_path_buf();
    let doxygen_path = state.config.doxygen_path.clone();

    tokio::task::spawn_blocking(move || -> Result<SymbolTable, AppError> {
        let mut table = SymbolTable::new(&repo_path, Box::new(DoxygenRunner::new(&doxygen_path)));
        if !table.xml_dir().join("index.xml").exists() {
            return Err(AppError::NotFound(
                "Symbol data not available; POST /api/repos/{id}/doxygen to generate".into(),
            ));
        }
        table.load().map_err(AppError::from)?;
        Ok(table)
    })
    .await
    .map_err(|e| AppError::Internal(e.into()))?
}

pub async fn get_repo_symbols(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<SymbolQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut table = load_symbol_table(&state, id).await?;
    let symbols: Vec<Symbol> = table.get_all_symbols(false)?;

    let filtered: Vec<_> = symbols
        .into_iter()
        .filter(|s| {
            query
                .kind
                .as_deref()
                .is_none_or(|k| s.kind.as_str() == k)
        })
        .filter(|s| {
            query
                .file
                .as_deref()
                .is_none_or(|f| s.file_path.to_string_lossy().ends_with(f))
        })
        .filter(|s| {
            query
                .name
                .as_deref()
                .is_none_or(|n| s.name.to_lowercase().contains(&n.to_lowercase()))
        })
        .collect();

    Ok(Json(serde_json::json!({
        "count": filtered.len(),
        "symbols": filtered,
    })))
}

pub async fn get_symbol_callers(
    State(state): State<SharedState>,
    Path((id, qualified_name)): Path<(Uuid, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut table = load_symbol_table(&state, id).await?;
    if table.get_symbol(&qualified_name, false)?.is_none() {
        return Err(AppError::NotFound("Symbol not found".into()));
    }
    let callers = table.get_callers(&qualified_name, false)?;
    Ok(Json(serde_json::json!({
        "function": qualified_name,
        "callers": callers,
    })))
}

pub async fn get_symbol_callees(
    State(state): State<SharedState>,
    Path((id, qualified_name)): Path<(Uuid, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut table = load_symbol_table(&state, id).await?;
    if table.get_symbol(&qualified_name, false)?.is_none() {
        return Err(AppError::NotFound("Symbol not found".into()));
    }
    let callees = table.get_callees(&qualified_name, false)?;
    Ok(Json(serde_json::json!({
        "function": qualified_name,
        "callees": callees,
    })))
}

// ============================================================================
// Mod submission and polling
// ============================================================================

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SubmitModRequest {
    Builtin {
        repo_name: String,
        repo_url: String,
        mod_type: String,
        description: String,
    },
    Commit {
        repo_name: String,
        repo_url: String,
        commit_hash: String,
        description: String,
    },
}

#[derive(Serialize)]
pub struct SubmitModResponse {
    pub id: Uuid,
    pub repo_name: String,
    pub repo_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    pub description: String,
}

pub async fn submit_mod(
    State(state): State<SharedState>,
    Json(req): Json<SubmitModRequest>,
) -> Result<Json<SubmitModResponse>, AppError> {
    let (request, response) = match req {
        SubmitModRequest::Builtin {
            repo_name,
            repo_url,
            mod_type,
            description,
        } => {
            let mod_instance =
                mod_from_id(&mod_type).map_err(|e| AppError::BadRequest(e.to_string()))?;
            let request = ModRequest::builtin(&repo_url, &repo_name, &description, mod_instance);
            let response = SubmitModResponse {
                id: request.id,
                repo_name,
                repo_url,
                mod_type: Some(mod_type),
                commit_hash: None,
                description,
            };
            (request, response)
        }
        SubmitModRequest::Commit {
            repo_name,
            repo_url,
            commit_hash,
            description,
        } => {
            if commit_hash.trim().is_empty() {
                return Err(AppError::BadRequest("commit_hash is required".into()));
            }
            let request = ModRequest::commit(&repo_url, &repo_name, &description, &commit_hash);
            let response = SubmitModResponse {
                id: request.id,
                repo_name,
                repo_url,
                mod_type: None,
                commit_hash: Some(commit_hash),
                description,
            };
            (request, response)
        }
    };

    state.results.update(request.id, ModResult::queued());
    state.queue.push(request);
    tracing::info!(id = %response.id, "mod request queued");

    Ok(Json(response))
}

pub async fn get_mod_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ModResult>, AppError> {
    let result = state
        .results
        .get(id)
        .ok_or(AppError::NotFound("Request not found".into()))?;
    Ok(Json(result))
}

pub async fn cancel_mod(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.results.get(id).is_none() {
        return Err(AppError::NotFound("Request not found".into()));
    }
    state.queue.cancel(id);
    Ok(StatusCode::ACCEPTED)
}

pub async fn get_queue_status(
    State(state): State<SharedState>,
) -> Json<serde_json::Value> {
    let results: HashMap<String, ModResult> = state
        .results
        .snapshot()
        .into_iter()
        .map(|(id, result)| (id.to_string(), result))
        .collect();
    Json(serde_json::json!({
        "queue_size": state.queue.len(),
        "results": results,
        "timestamp": chrono::Utc::now(),
    }))
}

// ============================================================================
// Registries
// ============================================================================

pub async fn get_available_mods() -> Json<serde_json::Value> {
    Json(serde_json::json!(available_mods()))
}

pub async fn get_available_validators() -> Json<serde_json::Value> {
    Json(serde_json::json!(available_validators()))
}

pub async fn get_available_compilers() -> Json<serde_json::Value> {
    Json(serde_json::json!(available_compilers()))
}

// ============================================================================
// Error handling
// ============================================================================

/// Application error type
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}
