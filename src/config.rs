//! config.rs
//!
//! Run configuration, read once from TOML and passed down explicitly.
//!
//! Every field has a default, so an absent or partial file is valid. The API
//! key is held in [`ApiKey`], which redacts itself in `Debug` output and has
//! no `Serialize` impl.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result, Stage};
use crate::llm::client::Provider;

pub const API_KEY_ENV: &str = "VERTEX_TESTER_API_KEY";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub generation: GenerationConfig,
    pub batching: BatchingConfig,
    pub retry: RetryConfig,
    pub pipeline: PipelineConfig,
}

/* ============================================================
   Sections
   ============================================================ */

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<ApiKey>,
    pub timeout_secs: u64,
    pub stream: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Gemini,
            model: "gemini-2.5-flash".into(),
            base_url: None,
            api_key: None,
            timeout_secs: 120,
            stream: true,
        }
    }
}

impl LlmConfig {
    /// Key from the file, else `VERTEX_TESTER_API_KEY`, else the provider's
    /// conventional variable.
    pub fn resolve_api_key(&self) -> Option<ApiKey> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    pub(crate) fn resolve_api_key_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<ApiKey> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(key.clone());
        }

        [API_KEY_ENV, self.provider.key_env()]
            .into_iter()
            .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
            .map(ApiKey::new)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    /// Harm category -> threshold, sent as-is.
    pub safety: BTreeMap<String, String>,
    pub system_instruction: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let safety = [
            "HARM_CATEGORY_HATE_SPEECH",
            "HARM_CATEGORY_DANGEROUS_CONTENT",
            "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "HARM_CATEGORY_HARASSMENT",
        ]
        .into_iter()
        .map(|c| (c.to_string(), "OFF".to_string()))
        .collect();

        Self {
            temperature: 0.3,
            top_p: 0.8,
            max_output_tokens: 8192,
            safety,
            system_instruction: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchingConfig {
    pub token_budget: usize,
    /// Fraction of the budget an oversized block is cut down to.
    pub split_ratio: f64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            token_budget: 195_000,
            split_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Responses shorter than this (trimmed) are treated as truncated.
    pub min_response_chars: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            min_response_chars: 40,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based): base, 2x base, 4x base...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub test_plan: bool,
    pub write_summary: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            test_plan: false,
            write_summary: true,
        }
    }
}

/* ============================================================
   Credentials
   ============================================================ */

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/* ============================================================
   Loading
   ============================================================ */

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vertex-tester/config.toml")
}

/// An explicit path must exist; a missing default file means all defaults.
pub fn load(path: Option<&Path>) -> Result<AppConfig> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (default_config_path(), false),
    };

    if !explicit && !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(AppConfig::default());
    }

    let text = fs::read_to_string(&path).map_err(|e| Error::io(Stage::Config, &path, e))?;
    let cfg = parse(&text).map_err(|e| match e {
        Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
        other => other,
    })?;

    debug!(path = %path.display(), provider = %cfg.llm.provider, model = %cfg.llm.model, "loaded config");
    Ok(cfg)
}

pub fn parse(text: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batching.token_budget == 0 {
            return Err(Error::Config("batching.token_budget must be positive".into()));
        }
        if !(self.batching.split_ratio > 0.0 && self.batching.split_ratio <= 1.0) {
            return Err(Error::Config(
                "batching.split_ratio must be in (0, 1]".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(Error::Config("llm.model cannot be empty".into()));
        }
        Ok(())
    }
}
