//! Single-case execution: renders the target for one test case, makes the
//! provider call, times it, validates the output, and optionally judges it.

use std::time::Instant;

use crate::judge;
use crate::model::target::{Credentials, JudgeConfig, ModelOverride, TestTarget};
use crate::model::test_case::{RuleType, TestCase, ValidationMode, ValidationRule};
use crate::model::test_run::TestResult;
use crate::provider::endpoint::EndpointProvider;
use crate::provider::{resolve_provider, ChatMessage, CompletionRequest, ProviderKind};
use crate::template;
use crate::validation;

// ============================================================================
// CaseExecution — everything needed to run one case once
// ============================================================================

pub struct CaseExecution<'a> {
    pub test_case: &'a TestCase,
    pub target: &'a TestTarget,
    /// Suite-level rules; case-level rules are appended on top.
    pub validation_rules: &'a [ValidationRule],
    pub judge: &'a JudgeConfig,
    pub credentials: &'a Credentials,
    pub model_override: Option<&'a ModelOverride>,
}

impl CaseExecution<'_> {
    /// Effective provider/model for prompt targets: the run-level override
    /// takes precedence over the target's configuration.
    pub fn effective_model(&self) -> Option<(ProviderKind, &str)> {
        if let Some(overridden) = self.model_override {
            return Some((overridden.provider, overridden.model.as_str()));
        }
        match self.target {
            TestTarget::Prompt(prompt) => Some((prompt.provider, prompt.model.as_str())),
            TestTarget::Endpoint(_) => None,
        }
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Run exactly one test case once. Adapter failures are captured into
/// `TestResult.error`; this function never fails the batch.
pub async fn execute_case(exec: &CaseExecution<'_>) -> TestResult {
    let case = exec.test_case;
    let mut result = TestResult {
        test_case_id: case.id.clone(),
        test_case_name: case.name.clone(),
        inputs: case.inputs.clone(),
        output: String::new(),
        validation_passed: false,
        validation_errors: Vec::new(),
        judge_score: None,
        judge_scores: None,
        response_time_ms: 0,
        error: None,
        iteration: None,
    };

    // Wall-clock latency covers the network call only, not validation.
    let started = Instant::now();
    let call_outcome = match exec.target {
        TestTarget::Prompt(_) => call_prompt_target(exec).await,
        TestTarget::Endpoint(endpoint) => EndpointProvider::new()
            .call(endpoint, &case.inputs)
            .await
            .map_err(|e| e.to_string()),
    };
    result.response_time_ms = started.elapsed().as_millis() as u64;

    let output = match call_outcome {
        Ok(output) => output,
        Err(message) => {
            tracing::warn!(test_case = %case.id, "Provider call failed: {message}");
            result.error = Some(message);
            return result;
        }
    };
    result.output = output;

    let rules = effective_rules(exec);
    let outcome = validation::validate(&result.output, &rules, Some(result.response_time_ms));
    result.validation_passed = outcome.passed;
    result.validation_errors = outcome.errors;

    if exec.judge.enabled {
        run_judge(exec, &mut result).await;
    }

    result
}

async fn call_prompt_target(exec: &CaseExecution<'_>) -> Result<String, String> {
    let TestTarget::Prompt(prompt) = exec.target else {
        return Err("Prompt call on non-prompt target".to_string());
    };

    let (kind, model) = match exec.effective_model() {
        Some(resolved) => resolved,
        None => return Err("No provider configured for prompt target".to_string()),
    };

    let api_key = match exec.credentials.get(kind) {
        Some(key) => key,
        None => return Err(format!("Missing credentials for provider: {}", kind.display_name())),
    };

    let messages: Vec<ChatMessage> = prompt
        .messages
        .iter()
        .map(|m| ChatMessage {
            role: m.role,
            content: template::render(&m.content, &exec.test_case.inputs),
        })
        .collect();

    let mut request = CompletionRequest::new(model, messages);
    request.temperature = prompt.temperature;
    request.max_tokens = prompt.max_tokens;
    request.top_p = prompt.top_p;
    request.frequency_penalty = prompt.frequency_penalty;
    request.presence_penalty = prompt.presence_penalty;

    let provider = resolve_provider(kind);
    provider
        .complete(&request, api_key)
        .await
        .map(|r| r.content)
        .map_err(|e| e.to_string())
}

/// Resolve the rule list for a case: suite rules plus case rules; in text
/// mode with no explicit rules, `expected_output` derives a containment
/// check.
fn effective_rules(exec: &CaseExecution<'_>) -> Vec<ValidationRule> {
    let case = exec.test_case;
    let mut rules: Vec<ValidationRule> = exec.validation_rules.to_vec();
    rules.extend(case.validation_rules.iter().cloned());

    if rules.is_empty() && case.validation_mode == ValidationMode::Text {
        if let Some(ref expected) = case.expected_output {
            rules.push(ValidationRule::new(RuleType::Contains, expected.as_str()));
        }
    }
    rules
}

/// Judge scoring is best-effort: a failure leaves the result unscored.
async fn run_judge(exec: &CaseExecution<'_>, result: &mut TestResult) {
    let fallback = exec.effective_model();
    let kind = match exec.judge.provider.or(fallback.map(|(k, _)| k)) {
        Some(kind) => kind,
        None => {
            tracing::warn!(test_case = %result.test_case_id, "Judge enabled but no provider resolvable; skipping");
            return;
        }
    };
    let model = exec
        .judge
        .model
        .as_deref()
        .or(fallback.map(|(_, m)| m))
        .unwrap_or_default()
        .to_string();
    if model.is_empty() {
        tracing::warn!(test_case = %result.test_case_id, "Judge enabled but no model resolvable; skipping");
        return;
    }

    let api_key = match exec.credentials.get(kind) {
        Some(key) => key,
        None => {
            tracing::warn!(
                test_case = %result.test_case_id,
                "Missing credentials for judge provider {}; skipping",
                kind.display_name()
            );
            return;
        }
    };

    let mut criteria = exec.judge.criteria.clone();
    criteria.extend(exec.test_case.judge_rules.iter().cloned());

    let provider = resolve_provider(kind);
    match judge::score_output(
        provider.as_ref(),
        &model,
        api_key,
        &criteria,
        exec.test_case.expected_output.as_deref(),
        &result.output,
    )
    .await
    {
        Ok(verdict) => {
            result.judge_score = Some(verdict.score);
            result.judge_scores = verdict.scores;
        }
        Err(e) => {
            tracing::warn!(test_case = %result.test_case_id, "Judge scoring failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::target::PromptTarget;

    fn make_case(id: &str) -> TestCase {
        TestCase::new(id, format!("case {id}"))
    }

    fn make_exec_parts() -> (TestCase, TestTarget, JudgeConfig, Credentials) {
        let target = TestTarget::Prompt(PromptTarget::new(ProviderKind::OpenAi, "gpt-4o"));
        (make_case("tc-1"), target, JudgeConfig::default(), Credentials::new())
    }

    #[test]
    fn test_effective_model_prefers_override() {
        let (case, target, judge, creds) = make_exec_parts();
        let overridden = ModelOverride {
            provider: ProviderKind::Anthropic,
            model: "claude-sonnet-4-20250514".into(),
        };
        let exec = CaseExecution {
            test_case: &case,
            target: &target,
            validation_rules: &[],
            judge: &judge,
            credentials: &creds,
            model_override: Some(&overridden),
        };
        let (kind, model) = exec.effective_model().unwrap();
        assert_eq!(kind, ProviderKind::Anthropic);
        assert_eq!(model, "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_effective_model_falls_back_to_target() {
        let (case, target, judge, creds) = make_exec_parts();
        let exec = CaseExecution {
            test_case: &case,
            target: &target,
            validation_rules: &[],
            judge: &judge,
            credentials: &creds,
            model_override: None,
        };
        let (kind, model) = exec.effective_model().unwrap();
        assert_eq!(kind, ProviderKind::OpenAi);
        assert_eq!(model, "gpt-4o");
    }

    #[test]
    fn test_effective_rules_derives_contains_from_expected_output() {
        let (mut case, target, judge, creds) = make_exec_parts();
        case.expected_output = Some("hello".into());
        let exec = CaseExecution {
            test_case: &case,
            target: &target,
            validation_rules: &[],
            judge: &judge,
            credentials: &creds,
            model_override: None,
        };
        let rules = effective_rules(&exec);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].rule_type, RuleType::Contains);
        assert_eq!(rules[0].value, serde_json::json!("hello"));
    }

    #[test]
    fn test_effective_rules_explicit_rules_win_over_expected_output() {
        let (mut case, target, judge, creds) = make_exec_parts();
        case.expected_output = Some("hello".into());
        let suite_rules = [ValidationRule::new(RuleType::MinLength, 3)];
        let exec = CaseExecution {
            test_case: &case,
            target: &target,
            validation_rules: &suite_rules,
            judge: &judge,
            credentials: &creds,
            model_override: None,
        };
        let rules = effective_rules(&exec);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].rule_type, RuleType::MinLength);
    }

    #[test]
    fn test_effective_rules_appends_case_rules() {
        let (mut case, target, judge, creds) = make_exec_parts();
        case.validation_rules
            .push(ValidationRule::new(RuleType::Contains, "x"));
        let suite_rules = [ValidationRule::new(RuleType::MinLength, 3)];
        let exec = CaseExecution {
            test_case: &case,
            target: &target,
            validation_rules: &suite_rules,
            judge: &judge,
            credentials: &creds,
            model_override: None,
        };
        let rules = effective_rules(&exec);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].rule_type, RuleType::MinLength);
        assert_eq!(rules[1].rule_type, RuleType::Contains);
    }

    #[tokio::test]
    async fn test_missing_credentials_captured_as_case_error() {
        let (case, target, judge, creds) = make_exec_parts();
        let exec = CaseExecution {
            test_case: &case,
            target: &target,
            validation_rules: &[],
            judge: &judge,
            credentials: &creds,
            model_override: None,
        };
        let result = execute_case(&exec).await;
        assert!(!result.validation_passed);
        let error = result.error.unwrap();
        assert!(error.contains("Missing credentials"));
        assert!(error.contains("OpenAI"));
    }
}
