use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::AuthError;

pub const DEFAULT_JIRA_API_BASE: &str = "https://api.atlassian.com";
pub const DEFAULT_EPIC_LINK_FIELD: &str = "customfield_10014";
pub const DEFAULT_LLM_API_URL: &str = "https://api.mistral.ai/v1/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "mistral-small";

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub jira: JiraConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub creation: CreationConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct JiraConfig {
    pub access_token: Option<String>,
    /// Token expiry in epoch milliseconds.
    pub expires_at: Option<i64>,
    pub cloud_id: Option<String>,
    pub api_base: Option<String>,
    pub epic_link_field: Option<String>,
}

impl JiraConfig {
    pub fn api_base(&self) -> &str {
        self.api_base.as_deref().unwrap_or(DEFAULT_JIRA_API_BASE)
    }

    pub fn epic_link_field(&self) -> &str {
        self.epic_link_field
            .as_deref()
            .unwrap_or(DEFAULT_EPIC_LINK_FIELD)
    }

    /// The bearer token, provided it is present and not past its expiry.
    pub fn bearer_token(&self, now_ms: i64) -> Result<&str, AuthError> {
        let token = self
            .access_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(AuthError::MissingToken)?;
        match self.expires_at {
            Some(expired_at) if expired_at <= now_ms => Err(AuthError::Expired { expired_at }),
            _ => Ok(token),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

impl LlmConfig {
    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_LLM_API_URL)
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_LLM_MODEL)
    }
}

/// What to do with a sub-task whose parent never got created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanSubtasks {
    #[default]
    Skip,
    CreateUnlinked,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct CreationConfig {
    #[serde(default)]
    pub orphan_subtasks: OrphanSubtasks,
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".reqjira")
}

fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

pub fn load_config() -> Result<AppConfig> {
    let mut config = load_config_from(&config_path())?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig =
        toml::from_str(&contents).with_context(|| "Failed to parse config.toml")?;
    Ok(config)
}

fn apply_env_overrides(config: &mut AppConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(token) = var("REQJIRA_JIRA_TOKEN") {
        config.jira.access_token = Some(token);
    }
    if let Some(key) = var("REQJIRA_LLM_API_KEY") {
        config.llm.api_key = Some(key);
    }
}
