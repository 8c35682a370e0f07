//! Chat-completions LLM provider
//!
//! OpenAI, Groq and OpenRouter all expose the same chat-completions API;
//! they differ only in base URL and default model.

use async_trait::async_trait;
use netauto_core::domain::generation::{EnhancedRequirements, ValidationResult};
use netauto_core::domain::pipeline::ValidationLevel;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::time::Duration;
use tracing::debug;

use crate::repository::llm::{LlmError, LlmProvider};

const SYSTEM_PROMPT: &str = "You are a senior network engineer. \
    Answer precisely and only with what is asked for.";

/// Hosted API a [`ChatCompletionsProvider`] talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Groq,
    OpenRouter,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Groq => "groq",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4",
            ProviderKind::Groq => "llama3-70b-8192",
            ProviderKind::OpenRouter => "openai/gpt-4",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "groq" => Ok(ProviderKind::Groq),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            other => Err(LlmError::UnknownProvider(other.to_string())),
        }
    }
}

/// Connection settings for a chat-completions provider
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// [`LlmProvider`] backed by an OpenAI-compatible chat-completions endpoint
pub struct ChatCompletionsProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionsProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        let base_url = settings
            .base_url
            .unwrap_or_else(|| settings.kind.default_base_url().to_string());

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: settings.api_key,
            model: settings
                .model
                .unwrap_or_else(|| settings.kind.default_model().to_string()),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends one system + user exchange and returns the reply text
    async fn complete(&self, prompt: String) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!("Sending chat completion request to {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("response contained no content".to_string()))
    }
}

#[async_trait]
impl LlmProvider for ChatCompletionsProvider {
    async fn enhance(
        &self,
        requirements: &str,
        device_type: &str,
        parameters: &Map<String, JsonValue>,
    ) -> Result<EnhancedRequirements, LlmError> {
        let prompt = format!(
            "Enhance these network requirements with missing technical details, \
             best practices, security considerations and implementation steps.\n\n\
             Requirements: {}\nDevice type: {}\nParameters: {}",
            requirements,
            device_type,
            JsonValue::Object(parameters.clone())
        );
        let enhanced = self.complete(prompt).await?;

        Ok(EnhancedRequirements {
            original: requirements.to_string(),
            enhanced: Some(enhanced),
            device_type: device_type.to_string(),
            parameters: parameters.clone(),
        })
    }

    async fn generate(
        &self,
        requirements: &EnhancedRequirements,
        device_type: &str,
    ) -> Result<String, LlmError> {
        let prompt = format!(
            "Generate a complete {} configuration for the following requirements. \
             Reply with the configuration only.\n\n{}",
            device_type,
            requirements.effective_text()
        );
        let reply = self.complete(prompt).await?;
        Ok(strip_code_fences(&reply))
    }

    async fn validate(
        &self,
        config: &str,
        device_type: &str,
        level: ValidationLevel,
    ) -> Result<ValidationResult, LlmError> {
        let prompt = format!(
            "Validate this {} configuration at the '{}' level. Reply with a single JSON \
             object with the keys valid (bool), errors (string array), warnings \
             (string array) and score (number between 0 and 1).\n\n{}",
            device_type,
            level.as_str(),
            config
        );
        let reply = self.complete(prompt).await?;
        let mut result = parse_validation(&reply)?;
        result.level = Some(level);
        Ok(result)
    }

    async fn optimize(
        &self,
        config: &str,
        device_type: &str,
        validation: &ValidationResult,
    ) -> Result<String, LlmError> {
        let findings: Vec<&str> = validation
            .errors
            .iter()
            .chain(validation.warnings.iter())
            .map(String::as_str)
            .collect();
        let prompt = format!(
            "Improve this {} configuration so that it addresses the findings below. \
             Reply with the configuration only.\n\nFindings:\n- {}\n\nConfiguration:\n{}",
            device_type,
            findings.join("\n- "),
            config
        );
        let reply = self.complete(prompt).await?;
        Ok(strip_code_fences(&reply))
    }
}

/// Removes a surrounding Markdown code fence, if any
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the language tag line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}

/// Extracts the JSON verdict from a validation reply
fn parse_validation(reply: &str) -> Result<ValidationResult, LlmError> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Err(LlmError::InvalidResponse(
                "validation reply did not contain a JSON object".to_string(),
            ));
        }
    };

    serde_json::from_str(json).map_err(|e| {
        LlmError::InvalidResponse(format!("validation reply is not valid JSON: {}", e))
    })
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(kind: ProviderKind) -> ProviderSettings {
        ProviderSettings {
            kind,
            api_key: "test-key".to_string(),
            model: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: 2000,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_provider_kind_defaults() {
        let provider = ChatCompletionsProvider::new(settings(ProviderKind::Groq)).unwrap();
        assert_eq!(provider.model(), "llama3-70b-8192");
        assert_eq!(
            provider.endpoint,
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_custom_base_url_is_trimmed() {
        let mut settings = settings(ProviderKind::OpenAi);
        settings.base_url = Some("http://localhost:11434/v1/".to_string());
        settings.model = Some("llama3".to_string());

        let provider = ChatCompletionsProvider::new(settings).unwrap();
        assert_eq!(provider.endpoint, "http://localhost:11434/v1/chat/completions");
        assert_eq!(provider.model(), "llama3");
    }

    #[test]
    fn test_parse_provider_kind() {
        assert_eq!("OpenRouter".parse::<ProviderKind>().unwrap(), ProviderKind::OpenRouter);
        assert!("anthropic-ish".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```cisco\nvlan 10\n name eng\n```"), "vlan 10\n name eng");
        assert_eq!(strip_code_fences("  vlan 10\n"), "vlan 10");
    }

    #[test]
    fn test_parse_validation_from_prose() {
        let reply = "Here is the verdict:\n\
            {\"valid\": true, \"errors\": [], \"warnings\": [\"no description\"], \"score\": 0.9}\n\
            Thanks";
        let result = parse_validation(reply).unwrap();
        assert!(result.valid);
        assert_eq!(result.warnings, vec!["no description".to_string()]);
        assert!((result.score - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_validation_rejects_missing_json() {
        assert!(matches!(
            parse_validation("looks fine to me"),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_chat_response_parsing() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"vlan 10"}}]}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.choices[0].message.content.as_deref(), Some("vlan 10"));
    }
}
