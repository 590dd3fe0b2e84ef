use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

// ── Provider selection ───────────────────────────────────────────

/// Which strategy produces suggestions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// External AI CLI (`gemini -p <prompt> --yolo`).
    #[default]
    Cli,
    /// Remote vision API over HTTPS.
    Api,
    /// Canned suggestion, no model involved.
    Mock,
}

impl ProviderKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cli" | "gemini-cli" => Some(Self::Cli),
            "api" => Some(Self::Api),
            "mock" => Some(Self::Mock),
            _ => None,
        }
    }
}

/// Which remote LLM API to call in [`ProviderKind::Api`] mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum LlmProvider {
    Anthropic,
    OpenAiCompatible,
    #[default]
    Gemini,
}

impl LlmProvider {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Some(Self::Anthropic),
            "openai" | "openaicompatible" | "openai-compatible" => Some(Self::OpenAiCompatible),
            "gemini" | "google" => Some(Self::Gemini),
            _ => None,
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAiCompatible => "OPENAI_API_KEY",
            Self::Gemini => "GOOGLE_API_KEY",
        }
    }
}

/// Full configuration for the chosen LLM API.
///
/// The `api_key` field is never written back out; it comes from the
/// environment or from the config file only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL override (OpenAI-compatible gateways, proxies).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model override. None = use provider default.
    #[serde(default)]
    pub model: Option<String>,
}

// ── App config ───────────────────────────────────────────────────

pub const DEFAULT_CLI_PATH: &str = "gemini";
pub const DEFAULT_BROKER_URL: &str = "http://127.0.0.1:8085";
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

fn default_cli_path() -> String {
    DEFAULT_CLI_PATH.to_string()
}

fn default_broker_url() -> String {
    DEFAULT_BROKER_URL.to_string()
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Application config, loaded from `config.json` and the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    /// Executable for [`ProviderKind::Cli`].
    #[serde(default = "default_cli_path")]
    pub cli_path: String,
    #[serde(default)]
    pub llm: LlmProviderConfig,
    /// Lightroom plugin broker.
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    /// Listen address of the HTTP server.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Flat key kept by older `config.json` files.
    #[serde(default, rename = "GOOGLE_API_KEY", skip_serializing)]
    legacy_google_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            cli_path: default_cli_path(),
            llm: LlmProviderConfig::default(),
            broker_url: default_broker_url(),
            bind: default_bind(),
            legacy_google_api_key: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

impl AppConfig {
    /// Read one config file. Missing files yield `Ok(None)`.
    pub fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let mut config: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        if config.llm.api_key.is_none() && config.llm.provider == LlmProvider::Gemini {
            config.llm.api_key = config.legacy_google_api_key.take();
        }
        debug!(path = %path.display(), "loaded config file");
        Ok(Some(config))
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(value) = get("LR_AI_PROVIDER") {
            self.provider = ProviderKind::parse(&value).ok_or(ConfigError::InvalidEnv {
                var: "LR_AI_PROVIDER",
                value,
            })?;
        }
        if let Some(value) = get("LR_AI_API_KIND") {
            self.llm.provider = LlmProvider::parse(&value).ok_or(ConfigError::InvalidEnv {
                var: "LR_AI_API_KIND",
                value,
            })?;
        }
        if let Some(value) = get("GEMINI_CLI_PATH") {
            self.cli_path = value;
        }
        if let Some(value) = get("LR_AI_MODEL") {
            self.llm.model = Some(value);
        }
        if let Some(value) = get("LR_AI_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = get(self.llm.provider.api_key_env()) {
            self.llm.api_key = Some(value);
        }
        if let Some(value) = get("LRC_BROKER_URL") {
            self.broker_url = value;
        }
        if let Some(value) = get("LR_AI_BIND") {
            self.bind = value;
        }
        Ok(())
    }
}

/// Load config from the per-user file, falling back to `./config.json`,
/// then apply environment overrides.
pub fn load_config(app_config_dir: &Path) -> Result<AppConfig, ConfigError> {
    let candidates = [
        crate::paths::config_path(app_config_dir),
        crate::paths::local_config_path(),
    ];
    let mut config = None;
    for path in &candidates {
        if let Some(found) = AppConfig::from_file(path)? {
            info!(path = %path.display(), "using config file");
            config = Some(found);
            break;
        }
    }
    let mut config = config.unwrap_or_default();
    config.apply_env(|var| std::env::var(var).ok())?;
    Ok(config)
}
