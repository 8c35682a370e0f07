//! Orchestrator configuration
//!
//! Defines the bind address, LLM provider connection settings, device
//! inventory location and background sweep interval.

use std::path::PathBuf;
use std::time::Duration;

use crate::repository::{ProviderKind, ProviderSettings};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on
    pub bind_addr: String,

    /// Which hosted API to talk to
    pub llm_provider: ProviderKind,

    /// API key; without one no LLM provider is registered
    pub llm_api_key: Option<String>,

    /// Model override (provider default otherwise)
    pub llm_model: Option<String>,

    /// Base URL override (provider default otherwise)
    pub llm_base_url: Option<String>,

    pub llm_temperature: f32,

    pub llm_max_tokens: u32,

    /// Upper bound for a single LLM request
    pub llm_timeout: Duration,

    /// JSON device inventory; no devices are known without it
    pub device_inventory: Option<PathBuf>,

    /// Upper bound for a device reachability probe
    pub device_connect_timeout: Duration,

    /// How often finished pipeline runs are swept; zero disables the sweep
    pub cleanup_interval: Duration,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - NETAUTO_BIND_ADDR (default: 0.0.0.0:8080)
    /// - LLM_PROVIDER (openai | groq | openrouter, default: openai)
    /// - LLM_API_KEY
    /// - LLM_MODEL
    /// - LLM_BASE_URL
    /// - LLM_TEMPERATURE (default: 0.7)
    /// - LLM_MAX_TOKENS (default: 2000)
    /// - LLM_TIMEOUT (seconds, default: 60)
    /// - DEVICE_INVENTORY (path to a JSON inventory)
    /// - DEVICE_CONNECT_TIMEOUT (seconds, default: 5)
    /// - PIPELINE_CLEANUP_INTERVAL (seconds, default: 300)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let llm_provider = match non_empty_var("LLM_PROVIDER") {
            Some(name) => name
                .parse::<ProviderKind>()
                .map_err(|e| anyhow::anyhow!("LLM_PROVIDER: {}", e))?,
            None => defaults.llm_provider,
        };

        let llm_temperature = std::env::var("LLM_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
            .unwrap_or(defaults.llm_temperature);

        let llm_max_tokens = std::env::var("LLM_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.llm_max_tokens);

        Ok(Self {
            bind_addr: non_empty_var("NETAUTO_BIND_ADDR").unwrap_or(defaults.bind_addr),
            llm_provider,
            llm_api_key: non_empty_var("LLM_API_KEY"),
            llm_model: non_empty_var("LLM_MODEL"),
            llm_base_url: non_empty_var("LLM_BASE_URL"),
            llm_temperature,
            llm_max_tokens,
            llm_timeout: seconds_var("LLM_TIMEOUT").unwrap_or(defaults.llm_timeout),
            device_inventory: non_empty_var("DEVICE_INVENTORY").map(PathBuf::from),
            device_connect_timeout: seconds_var("DEVICE_CONNECT_TIMEOUT")
                .unwrap_or(defaults.device_connect_timeout),
            cleanup_interval: seconds_var("PIPELINE_CLEANUP_INTERVAL")
                .unwrap_or(defaults.cleanup_interval),
        })
    }

    /// Provider settings, if an API key is configured
    pub fn provider_settings(&self) -> Option<ProviderSettings> {
        self.llm_api_key.as_ref().map(|api_key| ProviderSettings {
            kind: self.llm_provider,
            api_key: api_key.clone(),
            model: self.llm_model.clone(),
            base_url: self.llm_base_url.clone(),
            temperature: self.llm_temperature,
            max_tokens: self.llm_max_tokens,
            timeout: self.llm_timeout,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if !(0.0..=2.0).contains(&self.llm_temperature) {
            anyhow::bail!("llm_temperature must be between 0 and 2");
        }

        if self.llm_max_tokens == 0 {
            anyhow::bail!("llm_max_tokens must be greater than 0");
        }

        if self.llm_timeout.as_secs() == 0 {
            anyhow::bail!("llm_timeout must be greater than 0");
        }

        if self.device_connect_timeout.as_secs() == 0 {
            anyhow::bail!("device_connect_timeout must be greater than 0");
        }

        if let Some(base_url) = &self.llm_base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                anyhow::bail!("llm_base_url must start with http:// or https://");
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            llm_provider: ProviderKind::OpenAi,
            llm_api_key: None,
            llm_model: None,
            llm_base_url: None,
            llm_temperature: 0.7,
            llm_max_tokens: 2000,
            llm_timeout: Duration::from_secs(60),
            device_inventory: None,
            device_connect_timeout: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(300), // 5 minutes
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn seconds_var(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}
