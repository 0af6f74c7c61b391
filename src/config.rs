use serde::Deserialize;
use std::path::Path;

pub const API_KEY_ENV: &str = "NEWS_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Credential for the upstream provider, normally taken from `NEWS_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Country used for top headlines
    #[serde(default = "default_country")]
    pub country: String,
    /// Language used for searches
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Upstream request timeout in seconds; unset means wait indefinitely
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    "https://newsapi.org/v2".to_string()
}

fn default_country() -> String {
    "us".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_page_size() -> u32 {
    20
}

fn default_user_agent() -> String {
    "NewsFlow/1.0".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            country: default_country(),
            language: default_language(),
            page_size: default_page_size(),
            user_agent: default_user_agent(),
            bind_addr: default_bind_addr(),
            request_timeout_secs: None,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise start from defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment overrides on top of the file values
    pub fn with_env(mut self) -> Self {
        self.apply_overrides(
            std::env::var(API_KEY_ENV).ok(),
            std::env::var("NEWSFLOW_BIND").ok(),
        );
        self
    }

    fn apply_overrides(&mut self, api_key: Option<String>, bind_addr: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(addr) = bind_addr.filter(|a| !a.trim().is_empty()) {
            self.bind_addr = addr;
        }
    }

    /// The configured credential, ignoring blank values
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}
