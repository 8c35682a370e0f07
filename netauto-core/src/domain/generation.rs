//! Configuration generation types
//!
//! Values exchanged with the LLM provider during the generation pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::domain::pipeline::ValidationLevel;

/// Validation score above which a valid configuration skips optimization
pub const OPTIMIZATION_SKIP_SCORE: f64 = 0.8;

/// Requirements after (optional) LLM enhancement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedRequirements {
    pub original: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced: Option<String>,
    pub device_type: String,
    #[serde(default)]
    pub parameters: Map<String, JsonValue>,
}

impl EnhancedRequirements {
    /// Requirements passed through as-is, used when enhancement is unavailable
    pub fn unenhanced(
        requirements: impl Into<String>,
        device_type: impl Into<String>,
        parameters: Map<String, JsonValue>,
    ) -> Self {
        Self {
            original: requirements.into(),
            enhanced: None,
            device_type: device_type.into(),
            parameters,
        }
    }

    /// Text the generator should work from
    pub fn effective_text(&self) -> &str {
        self.enhanced.as_deref().unwrap_or(&self.original)
    }
}

/// Verdict returned by the validation step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<ValidationLevel>,
}

impl ValidationResult {
    /// Synthetic invalid verdict standing in for a validation call that failed
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![message.into()],
            warnings: Vec::new(),
            score: 0.0,
            level: None,
        }
    }

    /// A valid configuration with a high enough score needs no optimization
    pub fn skips_optimization(&self) -> bool {
        self.valid && self.score > OPTIMIZATION_SKIP_SCORE
    }
}
