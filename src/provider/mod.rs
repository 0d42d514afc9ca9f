pub mod anthropic;
pub mod endpoint;
pub mod gemini;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// =============================================================================
// Common request/response shapes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Provider-agnostic completion request. Adapters translate this into their
/// wire format; sampling options left `None` fall back to adapter defaults.
///
/// At most one `system` message, conventionally first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Provider-agnostic completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub content: String,
    /// Model identifier echoed or resolved by the provider.
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

// =============================================================================
// ProviderError
// =============================================================================

/// Adapter failure: non-2xx response, transport error, or malformed payload.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    pub status_code: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { status_code: None, message: message.into() }
    }

    pub fn with_status(status_code: u16, message: impl Into<String>) -> Self {
        Self { status_code: Some(status_code), message: message.into() }
    }
}

// =============================================================================
// ProviderKind — which LLM backend is selected
// =============================================================================

/// Supported LLM provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
    Mistral,
    Groq,
}

impl ProviderKind {
    pub fn all() -> &'static [ProviderKind] {
        &[
            ProviderKind::OpenAi,
            ProviderKind::Anthropic,
            ProviderKind::Gemini,
            ProviderKind::Mistral,
            ProviderKind::Groq,
        ]
    }

    /// Stable identifier used in serialized configs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Mistral => "mistral",
            ProviderKind::Groq => "groq",
        }
    }

    /// Human-readable provider name for error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Anthropic => "Anthropic",
            ProviderKind::Gemini => "Gemini",
            ProviderKind::Mistral => "Mistral",
            ProviderKind::Groq => "Groq",
        }
    }
}

// =============================================================================
// Provider trait
// =============================================================================

/// Abstraction over LLM completion backends.
///
/// Each adapter owns its own request/response marshalling: it normalizes a
/// `CompletionRequest` into the provider's wire format and the provider's
/// response back into a `CompletionResult`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable provider name for error messages.
    fn name(&self) -> &'static str;

    /// Static model catalog; no I/O.
    fn list_models(&self) -> &'static [&'static str];

    /// Execute one completion call against the provider's API.
    async fn complete(
        &self,
        request: &CompletionRequest,
        api_key: &str,
    ) -> Result<CompletionResult, ProviderError>;
}

// =============================================================================
// Factory
// =============================================================================

/// Create the appropriate adapter for the given provider kind.
pub fn resolve_provider(kind: ProviderKind) -> Box<dyn Provider> {
    match kind {
        ProviderKind::OpenAi => Box::new(openai::OpenAiCompatible::openai()),
        ProviderKind::Mistral => Box::new(openai::OpenAiCompatible::mistral()),
        ProviderKind::Groq => Box::new(openai::OpenAiCompatible::groq()),
        ProviderKind::Anthropic => Box::new(anthropic::AnthropicProvider::new()),
        ProviderKind::Gemini => Box::new(gemini::GeminiProvider::new()),
    }
}

/// Adapter HTTP client configuration: 30-second timeout on every call.
pub(crate) fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .expect("failed to build reqwest client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ProviderKind::OpenAi).unwrap(), r#""openai""#);
        assert_eq!(serde_json::to_string(&ProviderKind::Groq).unwrap(), r#""groq""#);
    }

    #[test]
    fn test_resolve_provider_names() {
        for kind in ProviderKind::all() {
            let provider = resolve_provider(*kind);
            assert_eq!(provider.name(), kind.display_name());
            assert!(!provider.list_models().is_empty());
        }
    }

    #[test]
    fn test_role_as_str() {
        assert_eq!(Role::System.as_str(), "system");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::with_status(429, "rate limited");
        assert_eq!(err.to_string(), "rate limited");
        assert_eq!(err.status_code, Some(429));
    }
}
