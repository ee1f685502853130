//! Server configuration loading and validation.
//!
//! Reads `alpinesight.yaml` and resolves environment variables. When no
//! config file exists, the completion provider is resolved from the
//! environment alone (`OPENROUTER_API_KEY`, then `OPENAI_API_KEY`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// File name searched for when `ALPINESIGHT_CONFIG` is not set.
pub const CONFIG_FILE_NAME: &str = "alpinesight.yaml";

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OPENROUTER_DEFAULT_MODEL: &str = "google/gemini-2.0-flash-exp:free";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors raised while locating, reading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },

    /// Neither a config file nor provider credentials in the environment.
    #[error(
        "no completion provider configured: set OPENROUTER_API_KEY or OPENAI_API_KEY, \
         or provide {CONFIG_FILE_NAME}"
    )]
    NoProvider,
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level configuration (mirrors `alpinesight.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chat-completion provider endpoint and credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// OpenAI-compatible base URL, without the `/chat/completions` suffix.
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

/// Limits for the tool-calling loop.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum completion-service rounds per chat turn.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Wall-clock bound for a single tool call.
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,
    /// Capacity of the per-request event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_weather_base_url")]
    pub weather_base_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Log file path. When absent, logs go to stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default)]
    pub filter: Option<String>,
}

fn default_request_timeout_secs() -> u64 {
    180
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}
fn default_max_rounds() -> u32 {
    10
}
fn default_tool_timeout_ms() -> u64 {
    30_000
}
fn default_event_buffer() -> usize {
    64
}
fn default_weather_base_url() -> String {
    "https://api.open-meteo.com/v1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            tool_timeout_ms: default_tool_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            weather_base_url: default_weather_base_url(),
        }
    }
}

impl ProviderConfig {
    fn new(base_url: &str, api_key: String, model: String) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key: Some(api_key),
            model,
            temperature: None,
            max_tokens: None,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Check the values serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orchestrator.max_rounds == 0 {
            return Err(ConfigError::Invalid {
                reason: "orchestrator.max_rounds must be at least 1".into(),
            });
        }
        if self.orchestrator.event_buffer == 0 {
            return Err(ConfigError::Invalid {
                reason: "orchestrator.event_buffer must be at least 1".into(),
            });
        }
        if self.orchestrator.tool_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "orchestrator.tool_timeout_ms must be at least 1".into(),
            });
        }
        if self.provider.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "provider.base_url is empty".into(),
            });
        }
        if self.provider.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "provider.model is empty".into(),
            });
        }
        Ok(())
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Checks `ALPINESIGHT_CONFIG` first, then searches upward from `start` for
/// `alpinesight.yaml`. Returns `None` when neither yields a file.
pub fn find_config_path(start: &Path) -> Option<PathBuf> {
    if let Ok(path) = std::env::var("ALPINESIGHT_CONFIG") {
        let candidate = PathBuf::from(path);
        if candidate.exists() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "ALPINESIGHT_CONFIG points to a missing file");
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Load and parse a config file, interpolating `${VAR}` / `${VAR:-default}`.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_config(&raw)
}

/// Parse config text after environment interpolation.
pub fn parse_config(raw: &str) -> Result<AppConfig, ConfigError> {
    let interpolated = interpolate_env_vars(raw);
    let config: AppConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
    config.validate()?;
    Ok(config)
}

/// Build a config from the environment alone, with defaults elsewhere.
pub fn config_from_env() -> Result<AppConfig, ConfigError> {
    let config = AppConfig {
        provider: provider_from_env(|key| std::env::var(key).ok())?,
        server: ServerConfig::default(),
        orchestrator: OrchestratorConfig::default(),
        tools: ToolsConfig::default(),
        logging: LoggingConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Resolve the provider from environment variables.
///
/// OpenRouter wins over OpenAI when both keys are present. `MODEL_NAME`
/// overrides the default model of whichever provider is chosen.
fn provider_from_env(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ProviderConfig, ConfigError> {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let model_override = non_empty("MODEL_NAME");

    if let Some(key) = non_empty("OPENROUTER_API_KEY") {
        let model = model_override.unwrap_or_else(|| OPENROUTER_DEFAULT_MODEL.to_string());
        return Ok(ProviderConfig::new(OPENROUTER_BASE_URL, key, model));
    }
    if let Some(key) = non_empty("OPENAI_API_KEY") {
        let model = model_override.unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string());
        return Ok(ProviderConfig::new(OPENAI_BASE_URL, key, model));
    }
    Err(ConfigError::NoProvider)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
