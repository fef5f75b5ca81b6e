//! LevelUp
//!
//! Modernizes legacy C/C++ repositories by applying atomic refactorings,
//! each validated by comparing compiler-generated assembly before and
//! after the change:
//! - git worktree management with per-request atomic branches
//! - doxygen-backed symbol index with per-file invalidation
//! - compiler drivers (msvc, clang) emitting Intel-syntax assembly
//! - conservative normalized-assembly validators
//! - an HTTP front end feeding a single background worker

pub mod api;
pub mod compiler;
pub mod engine;
pub mod model;
pub mod mods;
pub mod process;
pub mod queue;
pub mod refactor;
pub mod registry;
pub mod repo;
pub mod symbols;
pub mod validate;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::api::{create_router, ServerState};
use crate::engine::ModProcessor;
use crate::queue::{start_worker, RequestQueue, ResultStore};
use crate::repo::RepoCatalog;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub tools: ToolsYamlConfig,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub port: u16,
    pub workspace_path: String,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            workspace_path: "workspace".into(),
        }
    }
}

/// External tool paths and the active compiler selection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsYamlConfig {
    pub git: String,
    pub doxygen: String,
    pub msvc: String,
    pub clang: String,
    pub compiler: String,
}

impl Default for ToolsYamlConfig {
    fn default() -> Self {
        Self {
            git: "git".into(),
            doxygen: "doxygen".into(),
            msvc: "cl".into(),
            clang: "clang++".into(),
            compiler: compiler::clang::ID.into(),
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub workspace_path: String,
    pub server_port: u16,
    pub git_path: String,
    pub doxygen_path: String,
    pub msvc_path: String,
    pub clang_path: String,
    /// Active compiler id (`msvc` or `clang`).
    pub compiler: String,
}

impl Config {
    /// Load configuration from environment variables only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with
    /// env vars. Priority: env var > YAML > default.
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file
    /// doesn't exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        Ok(Self {
            workspace_path: std::env::var("LEVELUP_WORKSPACE")
                .unwrap_or(yaml.server.workspace_path),
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.server.port),
            git_path: std::env::var("GIT_PATH").unwrap_or(yaml.tools.git),
            doxygen_path: std::env::var("DOXYGEN_PATH").unwrap_or(yaml.tools.doxygen),
            msvc_path: std::env::var("MSVC_PATH").unwrap_or(yaml.tools.msvc),
            clang_path: std::env::var("CLANG_PATH").unwrap_or(yaml.tools.clang),
            compiler: std::env::var("LEVELUP_COMPILER").unwrap_or(yaml.tools.compiler),
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any
    /// failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }

    pub fn workspace(&self) -> PathBuf {
        PathBuf::from(&self.workspace_path)
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.workspace().join("repos")
    }
}

// ============================================================================
// Server startup
// ============================================================================

/// Wire everything together and serve until interrupted: workspace dirs,
/// the engine behind its single worker thread, and the HTTP router.
pub async fn start_server(config: Config) -> Result<()> {
    std::fs::create_dir_all(config.repos_dir())
        .with_context(|| format!("failed to create workspace at {}", config.workspace_path))?;

    let compiler = compiler::compiler_from_id(
        &config.compiler,
        &config.msvc_path,
        &config.clang_path,
    )?;
    tracing::info!(compiler = compiler.id(), "compiler selected");

    let processor = Arc::new(ModProcessor::new(
        &config.workspace(),
        &config.git_path,
        &config.doxygen_path,
        compiler,
    ));

    let (queue, rx) = RequestQueue::new();
    let results = Arc::new(ResultStore::new());
    let worker = start_worker(queue.clone(), rx, results.clone(), processor);

    let state = Arc::new(ServerState {
        config: Arc::new(config.clone()),
        catalog: RepoCatalog::new(&config.workspace()),
        queue,
        results,
        doxygen_status: Mutex::new(HashMap::new()),
    });

    let router = create_router(state);
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, router).await?;

    worker.join_worker();
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
