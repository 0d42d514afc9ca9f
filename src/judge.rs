//! Judge scoring — a second provider call that grades an output against
//! qualitative criteria. The judge is just another completion: it reuses the
//! provider abstraction and parses a JSON verdict out of the reply.

use std::collections::HashMap;

use crate::provider::{ChatMessage, CompletionRequest, Provider, ProviderError};
use crate::validation::find_json_fragment;

/// Judges grade deterministically.
const JUDGE_TEMPERATURE: f64 = 0.0;

const JUDGE_SYSTEM_PROMPT: &str = "You are an impartial evaluator. Grade the \
candidate output against the listed criteria. Respond with JSON only: \
{\"score\": <overall 0..1>, \"scores\": {\"<criterion>\": <0..1>, ...}}";

/// Parsed judge reply.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeVerdict {
    /// Overall score, clamped to 0..1.
    pub score: f64,
    /// Per-criterion breakdown, when the judge reported one.
    pub scores: Option<HashMap<String, f64>>,
}

/// Build the user-turn prompt embedding criteria, expected output, and the
/// candidate output.
pub fn build_judge_prompt(
    criteria: &[String],
    expected_output: Option<&str>,
    output: &str,
) -> String {
    let mut prompt = String::from("Evaluate the candidate output below.\n\nCriteria:\n");
    if criteria.is_empty() {
        prompt.push_str("- Overall quality and correctness\n");
    } else {
        for criterion in criteria {
            prompt.push_str("- ");
            prompt.push_str(criterion);
            prompt.push('\n');
        }
    }
    if let Some(expected) = expected_output {
        prompt.push_str("\nExpected output:\n");
        prompt.push_str(expected);
        prompt.push('\n');
    }
    prompt.push_str("\nCandidate output:\n");
    prompt.push_str(output);
    prompt
}

/// Parse the judge's reply into a verdict. Tolerates a fenced code block or
/// surrounding prose; `None` when no parseable score is found.
pub fn parse_judge_verdict(content: &str) -> Option<JudgeVerdict> {
    let fragment = find_json_fragment(content)?;
    let value: serde_json::Value = serde_json::from_str(&fragment).ok()?;

    let score = value.get("score")?.as_f64()?.clamp(0.0, 1.0);

    let scores = value.get("scores").and_then(|s| s.as_object()).map(|map| {
        map.iter()
            .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n.clamp(0.0, 1.0))))
            .collect::<HashMap<String, f64>>()
    });

    Some(JudgeVerdict { score, scores })
}

/// Issue the judge call and parse its verdict.
pub async fn score_output(
    provider: &dyn Provider,
    model: &str,
    api_key: &str,
    criteria: &[String],
    expected_output: Option<&str>,
    output: &str,
) -> Result<JudgeVerdict, ProviderError> {
    let mut request = CompletionRequest::new(
        model,
        vec![
            ChatMessage::system(JUDGE_SYSTEM_PROMPT),
            ChatMessage::user(build_judge_prompt(criteria, expected_output, output)),
        ],
    );
    request.temperature = Some(JUDGE_TEMPERATURE);

    let result = provider.complete(&request, api_key).await?;

    parse_judge_verdict(&result.content)
        .ok_or_else(|| ProviderError::new("Judge returned no parseable score"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_json_verdict() {
        let verdict = parse_judge_verdict(r#"{"score": 0.85}"#).unwrap();
        assert_eq!(verdict.score, 0.85);
        assert!(verdict.scores.is_none());
    }

    #[test]
    fn test_parse_fenced_verdict_with_breakdown() {
        let content = "```json\n{\"score\": 0.7, \"scores\": {\"clarity\": 0.9, \"accuracy\": 0.5}}\n```";
        let verdict = parse_judge_verdict(content).unwrap();
        assert_eq!(verdict.score, 0.7);
        let scores = verdict.scores.unwrap();
        assert_eq!(scores.get("clarity"), Some(&0.9));
        assert_eq!(scores.get("accuracy"), Some(&0.5));
    }

    #[test]
    fn test_parse_verdict_embedded_in_prose() {
        let content = r#"Here is my evaluation: {"score": 0.4} — weak answer."#;
        let verdict = parse_judge_verdict(content).unwrap();
        assert_eq!(verdict.score, 0.4);
    }

    #[test]
    fn test_parse_verdict_clamps_out_of_range() {
        let verdict = parse_judge_verdict(r#"{"score": 1.7}"#).unwrap();
        assert_eq!(verdict.score, 1.0);
    }

    #[test]
    fn test_parse_verdict_rejects_non_numeric_score() {
        assert!(parse_judge_verdict(r#"{"score": "great"}"#).is_none());
        assert!(parse_judge_verdict("no json here").is_none());
    }

    #[test]
    fn test_build_judge_prompt_lists_criteria() {
        let criteria = vec!["Is concise".to_string(), "Cites a source".to_string()];
        let prompt = build_judge_prompt(&criteria, Some("expected text"), "actual text");
        assert!(prompt.contains("- Is concise"));
        assert!(prompt.contains("- Cites a source"));
        assert!(prompt.contains("expected text"));
        assert!(prompt.contains("actual text"));
    }

    #[test]
    fn test_build_judge_prompt_default_criterion() {
        let prompt = build_judge_prompt(&[], None, "out");
        assert!(prompt.contains("Overall quality"));
    }
}
