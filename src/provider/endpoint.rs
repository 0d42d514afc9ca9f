use std::collections::HashMap;

use crate::model::target::{EndpointTarget, HttpMethod};
use crate::template;

use super::{build_http_client, ProviderError};

// =============================================================================
// HTTP endpoint pseudo-provider
// =============================================================================

/// Stand-in "provider" for raw HTTP targets: substitutes `{{variable}}`
/// placeholders in the URL and body template with test-case inputs, performs
/// the call, and extracts the output text from the response.
pub struct EndpointProvider {
    http: reqwest::Client,
}

impl EndpointProvider {
    pub fn new() -> Self {
        Self { http: build_http_client() }
    }

    /// Execute one call against the endpoint and return the output text.
    pub async fn call(
        &self,
        target: &EndpointTarget,
        inputs: &HashMap<String, String>,
    ) -> Result<String, ProviderError> {
        let url = template::render(&target.url, inputs);

        let mut request = self.http.request(as_reqwest_method(target.method), &url);

        for (name, value) in &target.headers {
            request = request.header(name, value);
        }
        if let Some(ref token) = target.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(ref body_template) = target.body_template {
            let body = template::render(body_template, inputs);
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Endpoint request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("Endpoint response read failed: {e}")))?;

        if !status.is_success() {
            return Err(ProviderError::with_status(
                status.as_u16(),
                format!("Endpoint returned {}: {}", status.as_u16(), truncate(&text, 300)),
            ));
        }

        match target.response_content_path {
            Some(ref path) => extract_content_path(&text, path).ok_or_else(|| {
                ProviderError::new(format!("Response content path \"{path}\" not found in response"))
            }),
            None => Ok(text),
        }
    }
}

impl Default for EndpointProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn as_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

/// Walk a dotted path (`data.choices.0.text`) through a JSON body. Numeric
/// segments index arrays. String leaves come back unquoted; other values are
/// re-serialized.
pub fn extract_content_path(body: &str, path: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(body).ok()?;

    let mut current = &root;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            serde_json::Value::Object(map) => map.get(segment)?,
            _ => return None,
        };
    }

    Some(match current {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_offset, _)) => format!("{}...", &s[..byte_offset]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple_key() {
        let body = r#"{"answer": "forty-two"}"#;
        assert_eq!(extract_content_path(body, "answer"), Some("forty-two".into()));
    }

    #[test]
    fn test_extract_nested_path_with_array_index() {
        let body = r#"{"data": {"choices": [{"text": "hello"}, {"text": "bye"}]}}"#;
        assert_eq!(
            extract_content_path(body, "data.choices.0.text"),
            Some("hello".into())
        );
        assert_eq!(
            extract_content_path(body, "data.choices.1.text"),
            Some("bye".into())
        );
    }

    #[test]
    fn test_extract_non_string_leaf_reserializes() {
        let body = r#"{"result": {"score": 0.5}}"#;
        assert_eq!(extract_content_path(body, "result.score"), Some("0.5".into()));
        assert_eq!(
            extract_content_path(body, "result"),
            Some(r#"{"score":0.5}"#.into())
        );
    }

    #[test]
    fn test_extract_missing_path() {
        let body = r#"{"a": 1}"#;
        assert_eq!(extract_content_path(body, "b"), None);
        assert_eq!(extract_content_path(body, "a.b"), None);
    }

    #[test]
    fn test_extract_non_json_body() {
        assert_eq!(extract_content_path("plain text", "a"), None);
    }

    #[test]
    fn test_extract_bad_array_index() {
        let body = r#"{"items": ["x"]}"#;
        assert_eq!(extract_content_path(body, "items.notanum"), None);
        assert_eq!(extract_content_path(body, "items.5"), None);
    }
}
