//! LLM provider repository
//!
//! Defines the capability interface the pipelines use to talk to a language
//! model, and the registry that selects the active provider by name.

use async_trait::async_trait;
use netauto_core::domain::generation::{EnhancedRequirements, ValidationResult};
use netauto_core::domain::pipeline::ValidationLevel;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors raised by LLM providers
#[derive(Debug, Error)]
pub enum LlmError {
    /// No provider has been registered
    #[error("No active LLM provider")]
    NoActiveProvider,

    /// Lookup of a provider name that was never registered
    #[error("LLM provider '{0}' is not registered")]
    UnknownProvider(String),

    /// HTTP transport failure
    #[error("LLM request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("LLM API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Provider answered with something we could not use
    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),
}

/// Text generation capabilities used by the pipelines
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Expands free-form requirements with technical detail
    async fn enhance(
        &self,
        requirements: &str,
        device_type: &str,
        parameters: &Map<String, JsonValue>,
    ) -> Result<EnhancedRequirements, LlmError>;

    /// Produces configuration text for the device type
    async fn generate(
        &self,
        requirements: &EnhancedRequirements,
        device_type: &str,
    ) -> Result<String, LlmError>;

    /// Reviews a configuration at the requested depth
    async fn validate(
        &self,
        config: &str,
        device_type: &str,
        level: ValidationLevel,
    ) -> Result<ValidationResult, LlmError>;

    /// Rewrites a configuration to address validation findings
    async fn optimize(
        &self,
        config: &str,
        device_type: &str,
        validation: &ValidationResult,
    ) -> Result<String, LlmError>;
}

/// Named set of providers with one active at a time
///
/// The registry is itself an [`LlmProvider`]: every call is forwarded to the
/// provider that is active when the call starts.
#[derive(Default)]
pub struct ProviderRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under `name`, replacing any previous one.
    ///
    /// The first provider registered becomes the active one.
    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        let name = name.into();
        let mut inner = self.inner.write().unwrap();
        if inner.active.is_none() {
            inner.active = Some(name.clone());
        }
        inner.providers.insert(name, provider);
    }

    /// Makes `name` the active provider
    pub fn switch(&self, name: &str) -> Result<(), LlmError> {
        let mut inner = self.inner.write().unwrap();
        if !inner.providers.contains_key(name) {
            return Err(LlmError::UnknownProvider(name.to_string()));
        }
        inner.active = Some(name.to_string());
        tracing::info!("Switched active LLM provider to {}", name);
        Ok(())
    }

    pub fn active_name(&self) -> Option<String> {
        self.inner.read().unwrap().active.clone()
    }

    /// Registered provider names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().unwrap().providers.keys().cloned().collect();
        names.sort();
        names
    }

    fn active(&self) -> Result<Arc<dyn LlmProvider>, LlmError> {
        let inner = self.inner.read().unwrap();
        inner
            .active
            .as_ref()
            .and_then(|name| inner.providers.get(name))
            .cloned()
            .ok_or(LlmError::NoActiveProvider)
    }
}

#[async_trait]
impl LlmProvider for ProviderRegistry {
    async fn enhance(
        &self,
        requirements: &str,
        device_type: &str,
        parameters: &Map<String, JsonValue>,
    ) -> Result<EnhancedRequirements, LlmError> {
        self.active()?
            .enhance(requirements, device_type, parameters)
            .await
    }

    async fn generate(
        &self,
        requirements: &EnhancedRequirements,
        device_type: &str,
    ) -> Result<String, LlmError> {
        self.active()?.generate(requirements, device_type).await
    }

    async fn validate(
        &self,
        config: &str,
        device_type: &str,
        level: ValidationLevel,
    ) -> Result<ValidationResult, LlmError> {
        self.active()?.validate(config, device_type, level).await
    }

    async fn optimize(
        &self,
        config: &str,
        device_type: &str,
        validation: &ValidationResult,
    ) -> Result<String, LlmError> {
        self.active()?
            .optimize(config, device_type, validation)
            .await
    }
}
