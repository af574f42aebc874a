use crate::error::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// Settings for the completion endpoint.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

/// Bounds applied to every generation session.
#[derive(Debug, Clone)]
pub struct GenerationLimits {
    pub max_files: usize,
    pub session_timeout: Duration,
}

impl Default for GenerationLimits {
    fn default() -> Self {
        Self {
            max_files: 60,
            session_timeout: Duration::from_secs(900),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub root_dir: PathBuf,
    pub retention: Duration,
    pub sweep_interval: Duration,
}

/// Process configuration, read once at startup and handed to every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    pub llm: LlmConfig,
    pub limits: GenerationLimits,
    pub preview: PreviewConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: parse_var("PORT", 5000)?,
            cert_path: env::var("CERT_PATH").ok(),
            key_path: env::var("KEY_PATH").ok(),
            llm: LlmConfig {
                api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
                api_url: env::var("GEMINI_API_URL")
                    .unwrap_or_else(|_| DEFAULT_GEMINI_API_URL.to_string()),
                timeout: Duration::from_secs(parse_nonzero("LLM_TIMEOUT_SECS", 120)?),
                max_attempts: parse_nonzero("LLM_MAX_ATTEMPTS", 1)?,
                retry_backoff: Duration::from_millis(parse_var("LLM_RETRY_BACKOFF_MS", 500)?),
            },
            limits: GenerationLimits {
                max_files: parse_nonzero("MAX_FILES_PER_SESSION", 60)?,
                session_timeout: Duration::from_secs(parse_nonzero("SESSION_TIMEOUT_SECS", 900)?),
            },
            preview: PreviewConfig {
                root_dir: PathBuf::from(
                    env::var("PREVIEW_DIR").unwrap_or_else(|_| "./previews".to_string()),
                ),
                retention: Duration::from_secs(parse_var("PREVIEW_RETENTION_SECS", 30 * 60)?),
                sweep_interval: Duration::from_secs(parse_nonzero("PREVIEW_SWEEP_SECS", 5 * 60)?),
            },
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => parse_value(key, &value),
        Err(_) => Ok(default),
    }
}

/// Like `parse_var`, for settings where zero would disable or break the feature.
fn parse_nonzero<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
{
    nonzero(key, parse_var(key, default)?)
}

fn nonzero<T: PartialEq + Default>(key: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        Err(ConfigError::Zero { key })
    } else {
        Ok(value)
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key,
        value: value.to_string(),
    })
}
