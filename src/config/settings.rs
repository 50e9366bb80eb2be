use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_TOKEN_BUFFER_MINUTES: u64 = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_REFRESH_INTERVAL_MINUTES: u64 = 45;
pub const DEFAULT_MAX_FAILURES_BEFORE_FALLBACK: u32 = 3;

/// ================================
/// Full library configuration
/// ================================
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MainConfig {
    #[serde(alias = "revos", alias = "revo")]
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    /// Named model settings for the extractor registry.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub llm_models: BTreeMap<String, LlmConfig>,
    pub logging: LoggingConfig,
    pub token_manager: TokenManagerConfig,
    pub server: ServerConfig,
    pub debug: bool,
}

/// ================================
/// OAuth client credentials + API endpoint
/// ================================
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    /// Base URL of the chat-completion API.
    pub base_url: String,
    /// refresh this many minutes before the token actually expires
    pub token_buffer_minutes: u64,
    /// extra attempts per refresh for network errors and 5xx answers
    pub max_retries: u32,
    /// seconds
    pub request_timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub auth_method: ClientAuthMethod,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_url: "https://api.example.com/oauth/token".to_owned(),
            base_url: "https://api.example.com/v1".to_owned(),
            token_buffer_minutes: DEFAULT_TOKEN_BUFFER_MINUTES,
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            scope: None,
            auth_method: ClientAuthMethod::Form,
        }
    }
}

/// Where the client credentials travel in the token request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientAuthMethod {
    /// `client_id` / `client_secret` form fields
    #[default]
    Form,
    /// HTTP Basic `Authorization` header
    Basic,
}

impl std::str::FromStr for ClientAuthMethod {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "form" | "client_secret_post" => Ok(Self::Form),
            "basic" | "client_secret_basic" => Ok(Self::Basic),
            other => Err(format!("unknown auth method '{other}', expected 'form' or 'basic'")),
        }
    }
}

/// ================================
/// Language model parameters
/// ================================
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_owned(),
            temperature: 0.1,
            max_tokens: Some(1000),
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            description: None,
        }
    }
}

/// ================================
/// Token manager behaviour
/// ================================
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TokenManagerConfig {
    pub refresh_interval_minutes: u64,
    pub max_failures_before_fallback: u32,
    pub enable_periodic_refresh: bool,
    pub enable_fallback: bool,
}

impl Default for TokenManagerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_minutes: DEFAULT_REFRESH_INTERVAL_MINUTES,
            max_failures_before_fallback: DEFAULT_MAX_FAILURES_BEFORE_FALLBACK,
            enable_periodic_refresh: true,
            enable_fallback: true,
        }
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Compact,
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self {
            level,
            format,
            file: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "compact" | "text" => Ok(LogFormat::Compact),
            other => Err(format!("unknown log format '{other}', expected 'json' or 'compact'")),
        }
    }
}

/// ================================
/// Status server
/// ================================
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub metrics: MetricsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8000,
            metrics: MetricsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub path: String,
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: "/metrics".to_owned(),
            is_enabled: true,
        }
    }
}

/// Serialisation format of a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from the file extension; unknown extensions are YAML.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .as_deref()
        {
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

impl MainConfig {
    /// Parse config text in the given format. Missing keys take their defaults.
    pub fn from_str_with_format(content: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| anyhow!("invalid YAML config: {e}"))
            }
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| anyhow!("invalid JSON config: {e}"))
            }
        }
    }

    /// Write the config to `path`; the secret is written as is.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, format: ConfigFormat) -> Result<()> {
        let path = path.as_ref();
        let content = match format {
            ConfigFormat::Yaml => serde_yaml::to_string(self)?,
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
        info!("configuration saved to {}", path.display());
        Ok(())
    }

    /// Models available to the extractor registry. Without `llm_models` the
    /// single `llm` section is exposed as `default`.
    pub fn models(&self) -> BTreeMap<String, LlmConfig> {
        if self.llm_models.is_empty() {
            BTreeMap::from([("default".to_owned(), self.llm.clone())])
        } else {
            self.llm_models.clone()
        }
    }

    /// Copy safe to expose: the client secret is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.auth.client_secret.is_empty() {
            copy.auth.client_secret = "***".to_owned();
        }
        copy
    }
}
