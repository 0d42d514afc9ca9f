use serde::{Deserialize, Serialize};

use super::{
    build_http_client, CompletionRequest, CompletionResult, Provider, ProviderError, Role,
    TokenUsage,
};

/// Applied when the caller leaves `temperature` unset.
const DEFAULT_TEMPERATURE: f64 = 0.7;

/// The Messages API requires `max_tokens`; used when the caller leaves it
/// unset.
const DEFAULT_MAX_TOKENS: u32 = 4096;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

static MODELS: &[&str] = &[
    "claude-sonnet-4-20250514",
    "claude-opus-4-20250514",
    "claude-3-5-haiku-20241022",
];

// =============================================================================
// Adapter — system-separate wire family
// =============================================================================

/// Messages-API adapter. The first `system` message moves into the dedicated
/// `system` field (omitted entirely when absent); only user/assistant turns
/// travel in the message array.
pub struct AnthropicProvider {
    http: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new() -> Self {
        Self { http: build_http_client() }
    }
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "Anthropic"
    }

    fn list_models(&self) -> &'static [&'static str] {
        MODELS
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        api_key: &str,
    ) -> Result<CompletionResult, ProviderError> {
        let body = build_body(request);
        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Anthropic request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("Anthropic response read failed: {e}")))?;

        if !status.is_success() {
            return Err(ProviderError::with_status(
                status.as_u16(),
                format!("Anthropic API error: {}", error_detail(&text)),
            ));
        }

        parse_response(&text, &request.model)
    }
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: Option<String>,
    stop_reason: Option<String>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

fn build_body(request: &CompletionRequest) -> MessagesBody<'_> {
    let system = request
        .messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.as_str());

    let messages = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| WireMessage { role: m.role.as_str(), content: &m.content })
        .collect();

    MessagesBody {
        model: &request.model,
        max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages,
        system,
        temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        top_p: request.top_p,
    }
}

fn parse_response(body: &str, requested_model: &str) -> Result<CompletionResult, ProviderError> {
    let parsed: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::new(format!("Malformed Anthropic response: {e}")))?;

    if parsed.content.is_empty() {
        return Err(ProviderError::new("No response from Anthropic"));
    }

    // Segmented text blocks concatenate in order with no separator.
    let content: String = parsed
        .content
        .iter()
        .filter(|b| b.block_type == "text")
        .map(|b| b.text.as_str())
        .collect();

    Ok(CompletionResult {
        content,
        model: parsed.model.unwrap_or_else(|| requested_model.to_string()),
        usage: parsed.usage.map(|u| TokenUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        }),
        finish_reason: parsed.stop_reason,
    })
}

fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.chars().take(300).collect())
}
