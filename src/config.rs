use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ordering::SortOrder;
use crate::types::StatusFilter;

const DEFAULT_ORDERING: &str = "date";
const DEFAULT_FILTER: &str = "all";

/// Persisted store configuration: the active ordering strategy name and the
/// default status filter for views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub ordering: String,
    pub filter: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ordering: DEFAULT_ORDERING.to_string(),
            filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn config_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("taskflow");
        path.push("config.toml");
        Some(path)
    }

    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        Self::load_from_path(&path)
    }

    fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(mut config) => {
                    config.validate();
                    config
                }
                Err(error) => {
                    warn!(
                        "failed to parse store config '{}': {}",
                        path.display(),
                        error
                    );
                    Self::default()
                }
            },
            Err(error) => {
                warn!(
                    "failed to read store config '{}': {}",
                    path.display(),
                    error
                );
                Self::default()
            }
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path().ok_or_else(|| anyhow!("unable to determine config path"))?;
        self.save_to_path(&path)
    }

    fn save_to_path(&self, path: &Path) -> anyhow::Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("invalid store config path"))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory '{}'", parent.display()))?;

        let mut validated = self.clone();
        validated.validate();
        let contents =
            toml::to_string_pretty(&validated).context("failed to serialize config to TOML")?;

        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow!("invalid store config file name"))?
            .to_string_lossy()
            .to_string();
        let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

        fs::write(&tmp_path, contents).with_context(|| {
            format!(
                "failed to write temporary config file '{}'",
                tmp_path.display()
            )
        })?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "failed to atomically rename config file '{}' to '{}'",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }

    /// Normalize unknown names to their documented fallbacks.
    fn validate(&mut self) {
        let ordering = SortOrder::resolve(&self.ordering).name();
        if ordering != self.ordering {
            warn!(
                "invalid ordering '{}' in store config; falling back to {ordering}",
                self.ordering
            );
            self.ordering = ordering.to_string();
        }

        let filter = StatusFilter::resolve(&self.filter).as_str();
        if filter != self.filter {
            warn!(
                "invalid filter '{}' in store config; falling back to {filter}",
                self.filter
            );
            self.filter = filter.to_string();
        }
    }
}
