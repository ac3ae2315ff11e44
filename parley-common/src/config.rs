//! Configuration management for Parley.
//!
//! The relay reads a single JSON file at `~/.parley/config.json`
//! (or the path in `PARLEY_CONFIG`).
//!
//! # Configuration Priority
//!
//! 1. Environment variables (`PARLEY_*`, `API_KEY`)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `PARLEY_BIND_ADDRESS` → network.bind
//! - `PARLEY_PORT` → network.port
//! - `PARLEY_PROVIDER` → completion.provider
//! - `PARLEY_MODEL` → completion.model
//! - `PARLEY_SENTIMENT` → analyzer.enabled
//! - `PARLEY_LOG_LEVEL` → observability.log_level
//! - `PARLEY_LOG_FORMAT` → observability.log_format
//! - `API_KEY` / `PARLEY_API_KEY` → secrets.api_key
//! - `<PROVIDER>_API_KEY` (e.g. `GROQ_API_KEY`) → secrets.api_key, if still unset

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".parley"),
        |dirs| dirs.home_dir().join(".parley"),
    )
}

/// Get the configuration file path, honouring `PARLEY_CONFIG`.
pub fn config_path() -> PathBuf {
    std::env::var("PARLEY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

/// Providers with a built-in endpoint. Any other name needs `completion.base_url`.
pub const KNOWN_PROVIDERS: &[&str] = &["groq", "openai", "mistral", "deepseek", "together"];

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the relay.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Listener settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Upstream chat-completion settings
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Turn analyzer (sentiment scoring) settings
    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    /// Logging settings
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Credentials
    #[serde(default)]
    pub secrets: SecretsConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply process environment overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("PARLEY_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(port) = lookup("PARLEY_PORT") {
            if let Ok(p) = port.parse() {
                self.network.port = p;
            }
        }

        if let Some(provider) = lookup("PARLEY_PROVIDER") {
            self.completion.provider = provider;
        }
        if let Some(model) = lookup("PARLEY_MODEL") {
            self.completion.model = model;
        }

        if let Some(flag) = lookup("PARLEY_SENTIMENT") {
            self.analyzer.enabled = parse_flag(&flag);
        }

        if let Some(level) = lookup("PARLEY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("PARLEY_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        self.apply_api_key_fallbacks(&lookup);
    }

    /// Resolve the upstream credential.
    ///
    /// `API_KEY` wins, then `PARLEY_API_KEY`, then the config file value,
    /// then the provider-specific variable.
    fn apply_api_key_fallbacks<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("API_KEY").or_else(|| lookup("PARLEY_API_KEY")) {
            self.secrets.api_key = Some(key);
            return;
        }

        if self.api_key().is_none() {
            let var = format!(
                "{}_API_KEY",
                self.completion.provider.to_ascii_uppercase().replace('-', "_")
            );
            if let Some(key) = lookup(&var) {
                self.secrets.api_key = Some(key);
            }
        }
    }

    /// Get the configured API key, treating blank values as absent.
    pub fn api_key(&self) -> Option<&str> {
        self.secrets
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Resolve the socket address the server listens on.
    pub fn listen_address(&self) -> crate::Result<SocketAddr> {
        let ip: IpAddr = self.network.bind.trim().parse().map_err(|e| {
            crate::Error::Config(format!("invalid bind address '{}': {}", self.network.bind, e))
        })?;
        Ok(SocketAddr::new(ip, self.network.port))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ============================================================================
// Sections
// ============================================================================

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default: "127.0.0.1" (local only)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port. Default: 8080
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Upstream chat-completion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Provider name (groq, openai, mistral, deepseek, together, or a custom name)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL override. Required for custom providers.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Model identifier sent upstream
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_top_p")]
    pub top_p: f64,

    /// Token budget used when the analyzer is disabled
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Whole-request timeout. Unset means the HTTP client default (none).
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: None,
        }
    }
}

/// Turn analyzer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalyzerConfig {
    /// Score each prompt and size the reply budget from its length
    #[serde(default)]
    pub enabled: bool,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to pin at `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

/// Credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// API key for the completion provider
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}
fn default_provider() -> String {
    "groq".into()
}
fn default_model() -> String {
    "llama3-8b-8192".into()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_top_p() -> f64 {
    0.9
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
