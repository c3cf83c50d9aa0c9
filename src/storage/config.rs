//! JSON Configuration Management
//!
//! Handles reading and writing the agent settings file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::settings::{AgentSettings, SettingsUpdate};
use crate::utils::error::{AgentError, AgentResult};
use crate::utils::paths::ensure_dir;

/// Configuration service for managing agent settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    settings: AgentSettings,
}

impl ConfigService {
    /// Open the settings file at `config_path`, creating it with defaults if missing
    pub fn open(config_path: impl Into<PathBuf>) -> AgentResult<Self> {
        let config_path = config_path.into();
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_dir(parent)?;
            }
        }

        let settings = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            let defaults = AgentSettings::default();
            Self::save_to_file(&config_path, &defaults)?;
            tracing::info!(path = %config_path.display(), "[Config] wrote default settings");
            defaults
        };

        Ok(Self {
            config_path,
            settings,
        })
    }

    /// Load settings from a file
    fn load_from_file(path: &Path) -> AgentResult<AgentSettings> {
        let content = fs::read_to_string(path)?;
        let settings: AgentSettings = serde_json::from_str(&content)?;
        settings.validate().map_err(AgentError::validation)?;
        Ok(settings)
    }

    /// Save settings to a file with pretty formatting
    fn save_to_file(path: &Path, settings: &AgentSettings) -> AgentResult<()> {
        settings.validate().map_err(AgentError::validation)?;
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the current settings
    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply a partial update and persist it.
    ///
    /// An update that fails validation leaves the in-memory settings untouched.
    pub fn update(&mut self, update: SettingsUpdate) -> AgentResult<AgentSettings> {
        let mut next = self.settings.clone();
        next.apply_update(update);
        Self::save_to_file(&self.config_path, &next)?;
        self.settings = next;
        Ok(self.settings.clone())
    }

    /// Save the current settings to disk
    pub fn save(&self) -> AgentResult<()> {
        Self::save_to_file(&self.config_path, &self.settings)
    }

    /// Reload settings from disk
    pub fn reload(&mut self) -> AgentResult<()> {
        self.settings = Self::load_from_file(&self.config_path)?;
        Ok(())
    }

    /// Reset settings to defaults
    pub fn reset(&mut self) -> AgentResult<()> {
        self.settings = AgentSettings::default();
        self.save()
    }
}
