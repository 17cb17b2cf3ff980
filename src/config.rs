use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

pub const FREE_BASE_URL: &str = "http://ip-api.com";
pub const PRO_BASE_URL: &str = "https://pro.ip-api.com";
pub const DEFAULT_LANG: &str = "en";

/// Languages the provider can localize location names into.
pub const SUPPORTED_LANGS: [&str; 8] = ["en", "de", "es", "pt-BR", "fr", "ja", "zh-CN", "ru"];

/// Service tier, decided by the presence of an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Plain HTTP, locally rate limited.
    Free,
    /// HTTPS, unlimited, key sent with every request.
    Pro,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API key for paid plans. Its presence selects the pro tier.
    pub api_key: Option<String>,

    /// Language for location names
    pub lang: String,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Overrides the tier's base URL for both tiers
    pub base_url: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            lang: DEFAULT_LANG.to_string(),
            timeout: Duration::from_secs(10),
            base_url: None,
        }
    }
}

impl ClientConfig {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn tier(&self) -> Tier {
        if self.api_key.is_some() {
            Tier::Pro
        } else {
            Tier::Free
        }
    }

    /// Base URL requests are sent to, honouring the override.
    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.tier()) {
            (Some(url), _) => url.as_str(),
            (None, Tier::Pro) => PRO_BASE_URL,
            (None, Tier::Free) => FREE_BASE_URL,
        }
    }

    /// Language to send, or `None` for the provider default.
    pub fn lang_param(&self) -> Option<&str> {
        if self.lang == DEFAULT_LANG {
            None
        } else {
            Some(self.lang.as_str())
        }
    }
}

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate_lang(lang: &str) -> Result<()> {
        if !SUPPORTED_LANGS.contains(&lang) {
            return Err(Error::Configuration(format!(
                "Unsupported language '{}'. Must be one of: {:?}",
                lang, SUPPORTED_LANGS
            )));
        }
        Ok(())
    }

    pub fn validate_timeout(timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Err(Error::Configuration(
                "Request timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_api_key(api_key: Option<&str>) -> Result<()> {
        if let Some(key) = api_key {
            if key.trim().is_empty() {
                return Err(Error::Configuration("API key cannot be empty".to_string()));
            }
        }
        Ok(())
    }

    pub fn validate_base_url(url: &str) -> Result<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::Configuration(
                "Base URL must start with 'http://' or 'https://'".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_client_config(config: &ClientConfig) -> Result<()> {
        Self::validate_api_key(config.api_key.as_deref())?;
        Self::validate_lang(&config.lang)?;
        Self::validate_timeout(config.timeout)?;
        Self::validate_base_url(config.base_url())?;
        Ok(())
    }
}
