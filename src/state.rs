use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use conduit_sdk::DEFAULT_RELAYS;

const CONFIG_FILE: &str = "conduit_config.json";
const DEFAULT_LOG_LEVEL: &str = "info";

// ============================================================================
// Persisted app config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_relays")]
    pub relays: Vec<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_relays() -> Vec<String> {
    DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            relays: default_relays(),
            log_level: default_log_level(),
        }
    }
}

// ============================================================================
// App state (sent to frontend)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub revision: u64,
    pub relays: Vec<String>,
    pub log_level: String,
}

// ============================================================================
// App state manager
// ============================================================================

pub struct AppStateManager {
    app_data_dir: PathBuf,
    config: AppConfig,
    revision: u64,
}

impl AppStateManager {
    /// Load `conduit_config.json` from `app_data_dir`, falling back to
    /// defaults when it is missing or unreadable.
    pub fn new(app_data_dir: PathBuf) -> Self {
        let config = Self::load_config(&app_data_dir).unwrap_or_default();
        Self {
            app_data_dir,
            config,
            revision: 0,
        }
    }

    pub fn is_first_launch(&self) -> bool {
        !self.app_data_dir.join(CONFIG_FILE).exists()
    }

    pub fn app_data_dir(&self) -> &Path {
        &self.app_data_dir
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn relays(&self) -> &[String] {
        &self.config.relays
    }

    pub fn set_relays(&mut self, relays: Vec<String>) -> Result<AppState, String> {
        self.config.relays = relays;
        self.save_config()?;
        self.bump_revision();
        Ok(self.snapshot())
    }

    pub fn set_log_level(&mut self, level: &str) -> Result<AppState, String> {
        self.config.log_level = level.to_string();
        self.save_config()?;
        self.bump_revision();
        Ok(self.snapshot())
    }

    pub fn snapshot(&self) -> AppState {
        AppState {
            revision: self.revision,
            relays: self.config.relays.clone(),
            log_level: self.config.log_level.clone(),
        }
    }

    pub fn bump_revision(&mut self) {
        self.revision += 1;
    }

    /// Write the current config to disk.
    pub fn save_config(&self) -> Result<(), String> {
        fs::create_dir_all(&self.app_data_dir)
            .map_err(|e| format!("failed to create data dir: {e}"))?;
        let json = serde_json::to_string_pretty(&self.config)
            .map_err(|e| format!("failed to encode config: {e}"))?;
        fs::write(self.app_data_dir.join(CONFIG_FILE), json)
            .map_err(|e| format!("failed to write config: {e}"))
    }

    fn load_config(dir: &Path) -> Option<AppConfig> {
        let contents = fs::read_to_string(dir.join(CONFIG_FILE)).ok()?;
        match serde_json::from_str(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("ignoring unreadable {CONFIG_FILE}: {e}");
                None
            }
        }
    }
}
