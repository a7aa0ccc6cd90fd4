// gptutils-core/src/config.rs

//! Handles configuration structures and parsing for the client library.

use crate::errors::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_MODEL: &str = "qwen-plus";
pub const DEFAULT_API_KEY_ENV_VAR: &str = "API_KEY";
pub const BASE_URL_ENV_VAR: &str = "API_BASE_URL";
pub const MODEL_ENV_VAR: &str = "API_MODEL";

/// Connection settings shared by every call made through a [`crate::ChatClient`].
#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    /// Fallback model used when a request does not name one.
    pub model: String,
    /// Whole-request timeout. `None` leaves reqwest's default (no timeout).
    pub timeout: Option<Duration>,
}

// Keep the key out of logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// On-disk TOML layout. The key itself never lives in the file, only the
/// name of the variable holding it.
#[derive(Deserialize, Debug, Clone)]
struct FileConfig {
    #[serde(default = "default_api_key_env_var")]
    api_key_env_var: String,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

fn default_api_key_env_var() -> String {
    DEFAULT_API_KEY_ENV_VAR.to_string()
}

impl Config {
    /// Creates a configuration with the default endpoint and model.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: None,
        }
    }

    /// Reads `API_KEY` (required), `API_BASE_URL` and `API_MODEL` from the
    /// process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = required_key(&lookup, DEFAULT_API_KEY_ENV_VAR)?;
        let mut config = Config::new(api_key);
        if let Some(base_url) = non_empty(lookup(BASE_URL_ENV_VAR)) {
            config.base_url = base_url;
        }
        if let Some(model) = non_empty(lookup(MODEL_ENV_VAR)) {
            config.model = model;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parses TOML configuration content, resolving the API key from the
    /// environment variable it names.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::from_toml_str_with(content, |key| std::env::var(key).ok())
    }

    pub(crate) fn from_toml_str_with<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: FileConfig = match toml::from_str(content) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse TOML content");
                return Err(ConfigError::Parse(e));
            }
        };

        let api_key = required_key(&lookup, &file.api_key_env_var)?;
        let mut config = Config::new(api_key);
        if let Some(base_url) = file.base_url {
            config.base_url = base_url;
        }
        if let Some(model) = file.model {
            config.model = model;
        }
        config.timeout = file.timeout_secs.map(Duration::from_secs);

        config.validate()?;
        tracing::info!(base_url = %config.base_url, model = %config.model, "Loaded configuration.");
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Checks that the key and model are present and the base URL parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey {
                var: DEFAULT_API_KEY_ENV_VAR.to_string(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            source,
        })?;
        Ok(())
    }

    /// Full URL of the chat-completions endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

fn required_key<F>(lookup: &F, var: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup(var)).ok_or_else(|| ConfigError::MissingApiKey {
        var: var.to_string(),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
