use anyhow::{Context, Result, bail};
use reqwest::Url;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/";
const DEFAULT_FALLBACK_URL: &str = "https://api.euron.one/api/v1/euri/chat/completions";
const DEFAULT_FALLBACK_MODEL: &str = "gpt-4.1-nano";
const DEFAULT_FALLBACK_MAX_TOKENS: u32 = 1000;
const DEFAULT_FALLBACK_TEMPERATURE: f32 = 0.3;
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_STORAGE_PATH: &str = "wa-chat-digest.json";

pub const FALLBACK_API_KEY_ENV: &str = "WA_DIGEST_FALLBACK_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub fallback: FallbackConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub model: String,
    pub base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_GEMINI_MODEL.to_owned(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_owned(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FALLBACK_URL.to_owned(),
            model: DEFAULT_FALLBACK_MODEL.to_owned(),
            api_key: None,
            max_tokens: DEFAULT_FALLBACK_MAX_TOKENS,
            temperature: DEFAULT_FALLBACK_TEMPERATURE,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORAGE_PATH),
        }
    }
}

impl FallbackConfig {
    /// Environment wins over the file so the bundled credential can stay out
    /// of checked-in config.
    pub fn resolved_api_key(&self) -> Option<String> {
        env_non_empty(FALLBACK_API_KEY_ENV).or_else(|| {
            self.api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_owned)
        })
    }
}

fn env_non_empty(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_owned()),
        _ => None,
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    parse_and_validate_config(&raw)
}

/// A missing file means "all defaults"; an unreadable or invalid one is an
/// error.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn parse_and_validate_config(raw: &str) -> Result<Config> {
    let config: Config = toml::from_str(raw).context("failed to parse config file as TOML")?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_gemini_config(config: &GeminiConfig) -> Result<()> {
    if config.model.trim().is_empty() {
        bail!("gemini.model must not be empty");
    }
    Url::parse(config.base_url.trim()).context("gemini.base_url must be a valid URL string")?;
    if config.timeout_seconds == 0 {
        bail!("gemini.timeout_seconds must be positive");
    }
    Ok(())
}

fn validate_fallback_config(config: &FallbackConfig) -> Result<()> {
    let url = config.url.trim();
    if url.is_empty() {
        bail!("fallback.url must not be empty");
    }
    Url::parse(url).context("fallback.url must be a valid URL string")?;
    if config.model.trim().is_empty() {
        bail!("fallback.model must not be empty");
    }
    if config.max_tokens == 0 {
        bail!("fallback.max_tokens must be positive");
    }
    if !(0.0..=2.0).contains(&config.temperature) {
        bail!("fallback.temperature must be between 0 and 2");
    }
    if config.timeout_seconds == 0 {
        bail!("fallback.timeout_seconds must be positive");
    }
    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    if config.path.as_os_str().is_empty() {
        bail!("storage.path must not be empty");
    }
    Ok(())
}

fn validate_config(config: &Config) -> Result<()> {
    validate_gemini_config(&config.gemini)?;
    validate_fallback_config(&config.fallback)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}
