//! LLM provider DTOs

use serde::{Deserialize, Serialize};

/// Registered LLM providers and the one currently in use
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderList {
    pub active: Option<String>,
    pub providers: Vec<String>,
}
