//! Persistent catalogue of configured repositories.
//!
//! A plain JSON array at `{workspace}/repos.json`; the catalogue is the
//! boundary layer's view, the engine only ever sees URLs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::worktree::repo_name_from_url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub post_checkout: Option<String>,
    #[serde(default)]
    pub build_command: Option<String>,
    #[serde(default)]
    pub single_tu_command: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Optional fields accepted by create/update requests.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RepoConfigUpdate {
    pub url: Option<String>,
    pub post_checkout: Option<String>,
    pub build_command: Option<String>,
    pub single_tu_command: Option<String>,
}

pub struct RepoCatalog {
    path: PathBuf,
}

impl RepoCatalog {
    pub fn new(workspace: &Path) -> Self {
        Self {
            path: workspace.join("repos.json"),
        }
    }

    pub fn load(&self) -> Result<Vec<RepoConfig>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", self.path.display()))
    }

    fn save(&self, configs: &[RepoConfig]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(configs)?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    /// Register a repository; the name is derived from the URL.
    pub fn create(&self, url: &str, fields: RepoConfigUpdate) -> Result<RepoConfig> {
        let config = RepoConfig {
            id: Uuid::new_v4(),
            name: repo_name_from_url(url),
            url: url.to_string(),
            post_checkout: fields.post_checkout,
            build_command: fields.build_command,
            single_tu_command: fields.single_tu_command,
            timestamp: chrono::Utc::now(),
        };
        let mut configs = self.load()?;
        configs.push(config.clone());
        self.save(&configs)?;
        Ok(config)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<RepoConfig>> {
        Ok(self.load()?.into_iter().find(|r| r.id == id))
    }

    /// Update optional fields; a changed URL re-derives the name.
    pub fn update(&self, id: Uuid, fields: RepoConfigUpdate) -> Result<Option<RepoConfig>> {
        let mut configs = self.load()?;
        let Some(config) = configs.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        if let Some(url) = fields.url {
            config.name = repo_name_from_url(&url);
            config.url = url;
        }
        if let Some(v) = fields.post_checkout {
            config.post_checkout = Some(v);
        }
        if let Some(v) = fields.build_command {
            config.build_command = Some(v);
        }
        if let Some(v) = fields.single_tu_command {
            config.single_tu_command = Some(v);
        }
        let updated = config.clone();
        self.save(&configs)?;
        Ok(Some(updated))
    }

    pub fn delete(&self, id: Uuid) -> Result<bool> {
        let mut configs = self.load()?;
        let before = configs.len();
        configs.retain(|r| r.id != id);
        let removed = configs.len() != before;
        if removed {
            self.save(&configs)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_update_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = RepoCatalog::new(dir.path());

        let created = catalog
            .create("https://example.com/org/widget.git", RepoConfigUpdate::default())
            .unwrap();
        assert_eq!(created.name, "widget");

        let updated = catalog
            .update(
                created.id,
                RepoConfigUpdate {
                    url: Some("https://example.com/org/gadget.git".into()),
                    post_checkout: Some("make generate".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "gadget");
        assert_eq!(updated.post_checkout.as_deref(), Some("make generate"));

        assert!(catalog.delete(created.id).unwrap());
        assert!(catalog.load().unwrap().is_empty());
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = RepoCatalog::new(dir.path());
        assert!(catalog.load().unwrap().is_empty());
        assert!(!catalog.delete(Uuid::new_v4()).unwrap());
    }
}
