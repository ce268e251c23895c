use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{GmailError, Result};
use crate::models::BULK_CATEGORIES;
use crate::reply::DEFAULT_REPLY_BODY;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub responder: ResponderConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Marker label applied to answered threads
    #[serde(default = "default_label_name")]
    pub label_name: String,
    #[serde(default = "default_reply_body")]
    pub reply_body: String,
    /// Category labels whose messages never get a reply
    #[serde(default = "default_excluded_categories")]
    pub excluded_categories: Vec<String>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            label_name: default_label_name(),
            reply_body: default_reply_body(),
            excluded_categories: default_excluded_categories(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_min_delay_secs")]
    pub min_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Stop after this many cycles; unset runs until interrupted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cycles: Option<u64>,
    /// Stop the loop when a cycle fails before scanning any message
    #[serde(default)]
    pub stop_on_error: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: default_min_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            max_cycles: None,
            stop_on_error: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub dry_run: bool,
    /// Upper bound on each Gmail API call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl ExecutionConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

fn default_label_name() -> String {
    "Vacation".to_string()
}

fn default_reply_body() -> String {
    DEFAULT_REPLY_BODY.to_string()
}

fn default_excluded_categories() -> Vec<String> {
    BULK_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

fn default_min_delay_secs() -> u64 {
    45
}

fn default_max_delay_secs() -> u64 {
    120
}

fn default_call_timeout_secs() -> u64 {
    30
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GmailError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GmailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let label_name = self.responder.label_name.trim();
        if label_name.is_empty() {
            return Err(GmailError::ConfigError(
                "responder.label_name cannot be empty".to_string(),
            ));
        }
        if label_name.contains('"') {
            return Err(GmailError::ConfigError(
                "responder.label_name cannot contain '\"' character".to_string(),
            ));
        }

        if self.responder.reply_body.trim().is_empty() {
            return Err(GmailError::ConfigError(
                "responder.reply_body cannot be empty".to_string(),
            ));
        }

        for category in &self.responder.excluded_categories {
            if category.trim().is_empty() {
                return Err(GmailError::ConfigError(
                    "responder.excluded_categories cannot contain empty strings".to_string(),
                ));
            }
        }

        if self.schedule.min_delay_secs == 0 {
            return Err(GmailError::ConfigError(
                "schedule.min_delay_secs must be at least 1".to_string(),
            ));
        }
        if self.schedule.min_delay_secs > self.schedule.max_delay_secs {
            return Err(GmailError::ConfigError(format!(
                "schedule.min_delay_secs ({}) cannot exceed schedule.max_delay_secs ({})",
                self.schedule.min_delay_secs, self.schedule.max_delay_secs
            )));
        }

        if self.schedule.max_cycles == Some(0) {
            return Err(GmailError::ConfigError(
                "schedule.max_cycles must be at least 1 when set".to_string(),
            ));
        }

        if self.execution.call_timeout_secs == 0 {
            return Err(GmailError::ConfigError(
                "execution.call_timeout_secs must be at least 1".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
