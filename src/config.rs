//! Configuration loading and management.
//!
//! Loads configuration from `./maum.toml` (or `$MAUM_CONFIG_PATH`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MaumConfig {
    /// Completion service configuration (`[llm]`).
    pub llm: LlmConfig,
    /// Session lifecycle configuration (`[session]`).
    pub session: SessionConfig,
    /// Conversation archive configuration (`[archive]`).
    pub archive: ArchiveConfig,
    /// Filesystem paths (`[paths]`).
    pub paths: PathsConfig,
}

impl MaumConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$MAUM_CONFIG_PATH` or `./maum.toml`. A missing
    /// file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from TOML file only, no env overrides.
    fn load_from_file() -> Result<Self> {
        let path = Self::config_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: MaumConfig =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(MaumConfig::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    fn config_path() -> PathBuf {
        match std::env::var("MAUM_CONFIG_PATH") {
            Ok(p) => PathBuf::from(p),
            Err(_) => PathBuf::from("maum.toml"),
        }
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // LLM.
        if let Some(v) = env("MAUM_OPENAI_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = env("MAUM_OPENAI_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = env("MAUM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = env("MAUM_LLM_TIMEOUT_SECS") {
            match v.parse() {
                Ok(n) => self.llm.timeout_seconds = n,
                Err(_) => tracing::warn!(
                    var = "MAUM_LLM_TIMEOUT_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }

        // Session.
        if let Some(v) = env("MAUM_SESSION_TTL_SECS") {
            match v.parse() {
                Ok(n) => self.session.ttl_seconds = n,
                Err(_) => tracing::warn!(
                    var = "MAUM_SESSION_TTL_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("MAUM_TEMPLATE_DIR") {
            self.session.template_dir = Some(v);
        }
        if let Some(v) = env("MAUM_STORE_PATH") {
            self.session.store_path = Some(v);
        }

        // Archive.
        if let Some(v) = env("MAUM_ARCHIVE_PATH") {
            self.archive.path = v;
        }
        if let Some(v) = env("MAUM_OWNER_ID") {
            self.archive.owner_id = v;
        }

        // Paths.
        if let Some(v) = env("MAUM_LOGS_DIR") {
            self.paths.logs_dir = v;
        }
    }

    /// Parse a TOML string into config (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: MaumConfig = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }
}

/// Completion service settings (`[llm]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API origin of an OpenAI-compatible endpoint.
    pub base_url: String,
    /// Bearer token. Usually supplied via `MAUM_OPENAI_API_KEY`.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Per-request timeout; expiry surfaces as a completion-service error.
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_owned(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_owned(),
            timeout_seconds: 30,
        }
    }
}

/// Session lifecycle settings (`[session]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity TTL before an idle session is evicted.
    pub ttl_seconds: u64,
    /// Optional directory of prompt template overrides (`*.toml`).
    pub template_dir: Option<String>,
    /// Optional SQLite path for durable working memory. Unset means the
    /// in-memory store (sessions do not survive a restart).
    pub store_path: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 30 * 60,
            template_dir: None,
            store_path: None,
        }
    }
}

/// Conversation archive settings (`[archive]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// SQLite path for finished conversations.
    pub path: String,
    /// Owner identity recorded on archived conversations. A real deployment
    /// gets this from the auth provider; the CLI runs single-user.
    pub owner_id: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            path: "maum.db".to_owned(),
            owner_id: "local".to_owned(),
        }
    }
}

/// Filesystem paths (`[paths]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for rotated JSON log files.
    pub logs_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            logs_dir: "logs".to_owned(),
        }
    }
}
