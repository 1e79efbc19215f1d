//! Configuration management for Deskpilot
//!
//! Handles loading, saving, and managing agent configuration: monitoring
//! cadence, history limits, recorder and screenshot settings, and the advisory
//! settings handed to planner implementations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub screenshots: ScreenshotConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub general: GeneralConfig,
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Period of the background context refresh
    pub monitor_interval_ms: u64,
    /// Rolling context history capacity
    pub context_history_limit: usize,
    /// Finished tasks kept in history
    pub task_history_limit: usize,
    /// Display captured by snapshots and `capture` steps
    pub display: u32,
    /// Per-task deadline, checked between steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_timeout_secs: Option<u64>,
    pub learning_enabled: bool,
    pub learning_history_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: 5000,
            context_history_limit: 100,
            task_history_limit: 1000,
            display: 0,
            task_timeout_secs: None,
            learning_enabled: true,
            learning_history_limit: 10_000,
        }
    }
}

impl AgentConfig {
    /// Monitoring period, never shorter than 1ms
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.max(1))
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }
}

/// Action recorder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Recorder buffer capacity
    pub max_actions: usize,
    /// Playback speed used when none is given
    pub default_speed: f64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_actions: 1000,
            default_speed: 1.0,
        }
    }
}

/// Screenshot persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotConfig {
    /// Write every `capture` step's image to `directory`
    pub save_to_disk: bool,
    pub directory: PathBuf,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            save_to_disk: false,
            directory: PathBuf::from("data/screenshots"),
        }
    }
}

/// Settings for planner implementations
///
/// The engine itself only enforces `max_steps`; the rest is passed through to
/// whatever planner is plugged in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Provider name: "anthropic", "openai", ...
    pub provider: String,
    pub model: String,
    /// Environment variable holding the provider API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub temperature: f32,
    /// Extra instructions appended to the planning prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
    /// Longest plan the agent accepts
    pub max_steps: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: None,
            temperature: 0.2,
            custom_instructions: None,
            max_steps: 100,
        }
    }
}

impl PlannerConfig {
    /// Get the API key from the configured or conventional environment variable
    pub fn api_key(&self) -> Option<String> {
        let env_name = match &self.api_key_env {
            Some(name) => name.clone(),
            None => format!("{}_API_KEY", self.provider.to_ascii_uppercase()),
        };
        std::env::var(env_name).ok().filter(|key| !key.is_empty())
    }
}

/// General application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Configuration manager for loading and saving config
pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    /// Create a config manager with a specific path
    pub fn with_path(config_path: PathBuf) -> Result<Self> {
        let config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            Config::default()
        };

        Ok(Self { config_path, config })
    }

    /// Get the default config path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("deskpilot").join("config.toml"))
    }

    fn load_from_path(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&self.config_path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }
}
