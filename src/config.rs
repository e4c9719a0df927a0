/// Browser configuration
///
/// Everything the browser needs to know before it starts: where local
/// documents live, which file types count as documents, how list changes
/// are reported and how thumbnails are rendered. Stored as a JSON file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{BrowserError, Result};
use crate::query::engine::{EngineConfig, SourceMode};
use crate::query::filter::ExtensionFilter;
use crate::query::reconcile::DiffPolicy;
use crate::state::recents::DEFAULT_RECENTS_CAPACITY;
use crate::thumbnail::cache::ThumbnailConfig;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BrowserConfig {
    /// Directory scanned when the external source is unavailable
    pub documents_dir: PathBuf,

    /// File extensions treated as documents; the first one names new documents
    pub allowed_extensions: Vec<String>,

    /// How list changes are reported
    pub diff_policy: DiffPolicy,

    /// Number of recently opened documents to keep
    pub recents_capacity: usize,

    /// Catalog database location; `None` uses the user data directory
    pub catalog_path: Option<PathBuf>,

    pub thumbnails: ThumbnailConfig,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            documents_dir: dirs::document_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            allowed_extensions: vec!["rtf".to_string(), "txt".to_string()],
            diff_policy: DiffPolicy::default(),
            recents_capacity: DEFAULT_RECENTS_CAPACITY,
            catalog_path: None,
            thumbnails: ThumbnailConfig::default(),
        }
    }
}

impl BrowserConfig {
    /// Read the configuration at `path`, or the defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reject settings the browser cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.filter().is_empty() {
            return Err(BrowserError::Config(
                "allowed_extensions must name at least one extension".to_string(),
            ));
        }
        if self.recents_capacity == 0 {
            return Err(BrowserError::Config("recents_capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn filter(&self) -> ExtensionFilter {
        ExtensionFilter::new(&self.allowed_extensions)
    }

    pub fn engine_config(&self, initial_mode: SourceMode) -> EngineConfig {
        EngineConfig {
            policy: self.diff_policy,
            local_directory: self.documents_dir.clone(),
            initial_mode,
        }
    }
}
