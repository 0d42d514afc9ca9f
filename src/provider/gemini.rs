use serde::{Deserialize, Serialize};

use super::{
    build_http_client, CompletionRequest, CompletionResult, Provider, ProviderError, Role,
    TokenUsage,
};

/// Applied when the caller leaves `temperature` unset.
const DEFAULT_TEMPERATURE: f64 = 0.7;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

static MODELS: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.0-flash",
];

// =============================================================================
// Adapter — turn-based contents wire family
// =============================================================================

/// generateContent adapter. The assistant role maps to `model`, `user` stays
/// as-is, and the system message rides in `systemInstruction` (omitted
/// entirely when absent).
pub struct GeminiProvider {
    http: reqwest::Client,
}

impl GeminiProvider {
    pub fn new() -> Self {
        Self { http: build_http_client() }
    }
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &'static str {
        "Gemini"
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
            .post(format!("{}/{}:generateContent", BASE_URL, request.model))
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("Gemini response read failed: {e}")))?;

        if !status.is_success() {
            return Err(ProviderError::with_status(
                status.as_u16(),
                format!("Gemini API error: {}", error_detail(&text)),
            ));
        }

        parse_response(&text, &request.model)
    }
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

fn build_body(request: &CompletionRequest) -> GenerateContentBody<'_> {
    let system_instruction = request
        .messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| Content {
            role: None,
            parts: vec![Part { text: &m.content }],
        });

    let contents = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| Content {
            role: Some(match m.role {
                Role::Assistant => "model",
                _ => "user",
            }),
            parts: vec![Part { text: &m.content }],
        })
        .collect();

    GenerateContentBody {
        contents,
        system_instruction,
        generation_config: GenerationConfig {
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_output_tokens: request.max_tokens,
            top_p: request.top_p,
        },
    }
}

fn parse_response(body: &str, requested_model: &str) -> Result<CompletionResult, ProviderError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::new(format!("Malformed Gemini response: {e}")))?;

    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::new("No response from Gemini"))?;

    // Segmented parts concatenate in order with no separator.
    let content: String = candidate
        .content
        .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
        .unwrap_or_default();

    Ok(CompletionResult {
        content,
        model: parsed
            .model_version
            .unwrap_or_else(|| requested_model.to_string()),
        usage: parsed.usage_metadata.map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        }),
        finish_reason: candidate.finish_reason,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;

    #[test]
    fn test_build_body_maps_assistant_to_model() {
        let request = CompletionRequest::new(
            "gemini-2.5-flash",
            vec![
                ChatMessage::user("Hello"),
                ChatMessage::assistant("Hi"),
                ChatMessage::user("How are you?"),
            ],
        );
        let body = serde_json::to_value(build_body(&request)).unwrap();
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
    }

    #[test]
    fn test_build_body_system_instruction() {
        let request = CompletionRequest::new(
            "gemini-2.5-flash",
            vec![ChatMessage::system("Be terse."), ChatMessage::user("Hello")],
        );
        let body = serde_json::to_value(build_body(&request)).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be terse.");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_build_body_omits_system_instruction_when_absent() {
        let request = CompletionRequest::new("gemini-2.5-flash", vec![ChatMessage::user("Hi")]);
        let body = serde_json::to_value(build_body(&request)).unwrap();
        assert!(body.get("systemInstruction").is_none());
        assert_eq!(body["generationConfig"]["temperature"], 0.7);
    }

    #[test]
    fn test_parse_response_concatenates_parts() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "Hello"}, {"text": " world"}], "role": "model"},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 4, "totalTokenCount": 12},
            "modelVersion": "gemini-2.5-flash-001"
        }"#;
        let result = parse_response(body, "gemini-2.5-flash").unwrap();
        assert_eq!(result.content, "Hello world");
        assert_eq!(result.model, "gemini-2.5-flash-001");
        assert_eq!(result.finish_reason.as_deref(), Some("STOP"));
        let usage = result.usage.unwrap();
        assert_eq!(usage.total_tokens, 12);
    }

    #[test]
    fn test_parse_response_empty_candidates_is_hard_failure() {
        let err = parse_response(r#"{"candidates": []}"#, "gemini-2.5-flash").unwrap_err();
        assert_eq!(err.to_string(), "No response from Gemini");
    }
}
