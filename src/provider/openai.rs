use serde::{Deserialize, Serialize};

use super::{
    build_http_client, CompletionRequest, CompletionResult, Provider, ProviderError, TokenUsage,
};

/// Applied when the caller leaves `temperature` unset.
const DEFAULT_TEMPERATURE: f64 = 0.7;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

static OPENAI_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4.1",
    "gpt-4.1-mini",
    "o3-mini",
];

static MISTRAL_MODELS: &[&str] = &[
    "mistral-large-latest",
    "mistral-small-latest",
    "open-mistral-nemo",
    "codestral-latest",
];

static GROQ_MODELS: &[&str] = &[
    "llama-3.3-70b-versatile",
    "llama-3.1-8b-instant",
    "mixtral-8x7b-32768",
    "gemma2-9b-it",
];

// =============================================================================
// Adapter — the OpenAI-compatible wire family
// =============================================================================

/// Chat-completions adapter shared by the providers that speak the OpenAI
/// wire format. Roles pass through unchanged.
pub struct OpenAiCompatible {
    display_name: &'static str,
    base_url: String,
    models: &'static [&'static str],
    http: reqwest::Client,
}

impl OpenAiCompatible {
    pub fn openai() -> Self {
        Self::with_base_url("OpenAI", OPENAI_BASE_URL, OPENAI_MODELS)
    }

    pub fn mistral() -> Self {
        Self::with_base_url("Mistral", MISTRAL_BASE_URL, MISTRAL_MODELS)
    }

    pub fn groq() -> Self {
        Self::with_base_url("Groq", GROQ_BASE_URL, GROQ_MODELS)
    }

    fn with_base_url(
        display_name: &'static str,
        base_url: &str,
        models: &'static [&'static str],
    ) -> Self {
        Self {
            display_name,
            base_url: base_url.to_string(),
            models,
            http: build_http_client(),
        }
    }
}

#[async_trait::async_trait]
impl Provider for OpenAiCompatible {
    fn name(&self) -> &'static str {
        self.display_name
    }

    fn list_models(&self) -> &'static [&'static str] {
        self.models
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        api_key: &str,
    ) -> Result<CompletionResult, ProviderError> {
        let body = build_body(request);
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("{} request failed: {e}", self.display_name)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("{} response read failed: {e}", self.display_name)))?;

        if !status.is_success() {
            return Err(ProviderError::with_status(
                status.as_u16(),
                format!("{} API error: {}", self.display_name, error_detail(&text)),
            ));
        }

        parse_response(&text, &request.model, self.display_name)
    }
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    model: Option<String>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

fn build_body(request: &CompletionRequest) -> ChatCompletionBody<'_> {
    ChatCompletionBody {
        model: &request.model,
        messages: request
            .messages
            .iter()
            .map(|m| WireMessage { role: m.role.as_str(), content: &m.content })
            .collect(),
        temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        max_tokens: request.max_tokens,
        top_p: request.top_p,
        frequency_penalty: request.frequency_penalty,
        presence_penalty: request.presence_penalty,
    }
}

fn parse_response(
    body: &str,
    requested_model: &str,
    display_name: &str,
) -> Result<CompletionResult, ProviderError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::new(format!("Malformed {display_name} response: {e}")))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::new(format!("No response from {display_name}")))?;

    Ok(CompletionResult {
        content: choice.message.content.unwrap_or_default(),
        model: parsed.model.unwrap_or_else(|| requested_model.to_string()),
        usage: parsed.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
        finish_reason: choice.finish_reason,
    })
}

/// Pull the human-readable message out of an error payload, falling back to
/// the raw body.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;

    fn make_request() -> CompletionRequest {
        CompletionRequest::new(
            "gpt-4o",
            vec![
                ChatMessage::system("Be terse."),
                ChatMessage::user("Hello"),
                ChatMessage::assistant("Hi"),
            ],
        )
    }

    #[test]
    fn test_build_body_passes_roles_through() {
        let body = serde_json::to_value(build_body(&make_request())).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][2]["role"], "assistant");
    }

    #[test]
    fn test_build_body_applies_default_temperature() {
        let body = serde_json::to_value(build_body(&make_request())).unwrap();
        assert_eq!(body["temperature"], 0.7);
        // Options left unset are omitted from the wire payload entirely
        assert!(body.get("maxTokens").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_build_body_keeps_explicit_options() {
        let mut request = make_request();
        request.temperature = Some(0.0);
        request.max_tokens = Some(256);
        let body = serde_json::to_value(build_body(&request)).unwrap();
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["max_tokens"], 256);
    }

    #[test]
    fn test_parse_response_ok() {
        let body = r#"{
            "model": "gpt-4o-2024-11-20",
            "choices": [{"message": {"content": "Hello there"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let result = parse_response(body, "gpt-4o", "OpenAI").unwrap();
        assert_eq!(result.content, "Hello there");
        assert_eq!(result.model, "gpt-4o-2024-11-20");
        assert_eq!(result.finish_reason.as_deref(), Some("stop"));
        let usage = result.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn test_parse_response_empty_choices_is_hard_failure() {
        let err = parse_response(r#"{"choices": []}"#, "gpt-4o", "OpenAI").unwrap_err();
        assert_eq!(err.to_string(), "No response from OpenAI");
    }

    #[test]
    fn test_parse_response_falls_back_to_requested_model() {
        let body = r#"{"choices": [{"message": {"content": "x"}, "finish_reason": null}]}"#;
        let result = parse_response(body, "gpt-4o", "OpenAI").unwrap();
        assert_eq!(result.model, "gpt-4o");
        assert!(result.usage.is_none());
    }

    #[test]
    fn test_parse_response_malformed_json() {
        let err = parse_response("not json", "gpt-4o", "Groq").unwrap_err();
        assert!(err.to_string().contains("Malformed Groq response"));
    }

    #[test]
    fn test_error_detail_extracts_nested_message() {
        let body = r#"{"error": {"message": "Invalid API key", "type": "auth"}}"#;
        assert_eq!(error_detail(body), "Invalid API key");
        assert_eq!(error_detail("plain failure"), "plain failure");
    }
}
