use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::provider::{ProviderKind, Role};

// ============================================================================
// Targets — the prompt or HTTP endpoint under test
// ============================================================================

/// One message slot of a prompt target; `content` may carry `{{variable}}`
/// placeholders filled from test-case inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTemplate {
    pub role: Role,
    pub content: String,
}

impl MessageTemplate {
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

/// An LLM prompt target: provider, model, and the message templates plus
/// sampling options forwarded to the adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTarget {
    pub provider: ProviderKind,
    pub model: String,
    pub messages: Vec<MessageTemplate>,
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

impl PromptTarget {
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

/// A raw HTTP endpoint target. `url` and `body_template` may carry
/// `{{variable}}` placeholders filled from test-case inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointTarget {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    /// Dotted path into the JSON response body (`data.choices.0.text`).
    /// Absent, the raw body text is the output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_content_path: Option<String>,
}

impl EndpointTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::default(),
            headers: HashMap::new(),
            body_template: None,
            bearer_token: None,
            response_content_path: None,
        }
    }
}

/// The target under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TestTarget {
    Prompt(PromptTarget),
    Endpoint(EndpointTarget),
}

// ============================================================================
// Run-level options
// ============================================================================

/// Overrides the target's configured provider/model for a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOverride {
    pub provider: ProviderKind,
    pub model: String,
}

/// Judge scoring configuration. When enabled, every case issues a second
/// provider call that scores the output against the criteria.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Falls back to the effective run provider when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    /// Falls back to the effective run model when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<String>,
}

// ============================================================================
// Credentials
// ============================================================================

/// Resolved provider secrets, handed in by the (excluded) auth layer.
/// Absence of a required key is a precondition failure, never silently
/// skipped.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    keys: HashMap<ProviderKind, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider: ProviderKind, key: impl Into<String>) {
        self.keys.insert(provider, key.into());
    }

    pub fn with_key(mut self, provider: ProviderKind, key: impl Into<String>) -> Self {
        self.insert(provider, key);
        self
    }

    pub fn get(&self, provider: ProviderKind) -> Option<&str> {
        self.keys.get(&provider).map(String::as_str)
    }

    pub fn require(&self, provider: ProviderKind) -> Result<&str, EngineError> {
        self.get(provider)
            .ok_or_else(|| EngineError::MissingCredentials(provider.display_name().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_tagged_serialization() {
        let target = TestTarget::Endpoint(EndpointTarget::new("https://api.example.com/run"));
        let value = serde_json::to_value(&target).unwrap();
        assert_eq!(value["type"], "endpoint");
        assert_eq!(value["url"], "https://api.example.com/run");

        let target = TestTarget::Prompt(PromptTarget::new(ProviderKind::OpenAi, "gpt-4o"));
        let value = serde_json::to_value(&target).unwrap();
        assert_eq!(value["type"], "prompt");
        assert_eq!(value["provider"], "openai");
    }

    #[test]
    fn test_http_method_default_and_rename() {
        let target: EndpointTarget =
            serde_json::from_str(r#"{"url":"https://x.test"}"#).unwrap();
        assert_eq!(target.method, HttpMethod::Post);

        let value = serde_json::to_value(HttpMethod::Delete).unwrap();
        assert_eq!(value, "DELETE");
    }

    #[test]
    fn test_credentials_require() {
        let creds = Credentials::new().with_key(ProviderKind::Anthropic, "sk-test");
        assert_eq!(creds.require(ProviderKind::Anthropic).unwrap(), "sk-test");

        let err = creds.require(ProviderKind::Gemini).unwrap_err();
        assert!(err.to_string().contains("Gemini"));
    }
}
