//! Rule-based output validation.
//!
//! Pure, synchronous, deterministic: every rule in the list is evaluated
//! against a single `(output, response_time_ms)` pair and the failures are
//! unioned — no short-circuit on first failure. Malformed rule definitions
//! (bad regex, bad schema JSON, non-numeric limits) downgrade to validation
//! failure messages so one bad rule cannot abort a whole run.

use crate::model::test_case::{RuleType, ValidationRule};

// ============================================================================
// Outcome
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    fn from_errors(errors: Vec<String>) -> Self {
        Self { passed: errors.is_empty(), errors }
    }
}

/// Evaluate every rule against the output. An empty rule list always passes
/// with zero errors.
pub fn validate(
    output: &str,
    rules: &[ValidationRule],
    response_time_ms: Option<u64>,
) -> ValidationOutcome {
    let mut errors = Vec::new();
    for rule in rules {
        if let Some(default_message) = check_rule(output, rule, response_time_ms) {
            // A caller-supplied message replaces the default verbatim.
            errors.push(rule.message.clone().unwrap_or(default_message));
        }
    }
    ValidationOutcome::from_errors(errors)
}

// ============================================================================
// Rule evaluation
// ============================================================================

/// Returns `Some(default message)` on failure, `None` on pass. A rule value
/// of the wrong shape is itself a failure, never a fault.
fn check_rule(output: &str, rule: &ValidationRule, response_time_ms: Option<u64>) -> Option<String> {
    match rule.rule_type {
        RuleType::Contains => match rule.value.as_str() {
            None => Some(malformed("contains", "string")),
            Some(needle) if output.contains(needle) => None,
            Some(needle) => Some(format!("Output does not contain \"{needle}\"")),
        },
        RuleType::Excludes => match rule.value.as_str() {
            None => Some(malformed("excludes", "string")),
            Some(needle) if !output.contains(needle) => None,
            Some(needle) => Some(format!("Output contains forbidden text \"{needle}\"")),
        },
        RuleType::MinLength => {
            let len = output.chars().count();
            match as_number(&rule.value) {
                None => Some(malformed("minLength", "numeric")),
                Some(min) if (len as f64) >= min => None,
                Some(min) => Some(format!("Output length {len} is below minimum {min}")),
            }
        }
        RuleType::MaxLength => {
            let len = output.chars().count();
            match as_number(&rule.value) {
                None => Some(malformed("maxLength", "numeric")),
                Some(max) if (len as f64) <= max => None,
                Some(max) => Some(format!("Output length {len} exceeds maximum {max}")),
            }
        }
        RuleType::Regex => match rule.value.as_str() {
            None => Some(malformed("regex", "string")),
            Some(pattern) => match regex::Regex::new(pattern) {
                Err(_) => Some(format!("Regex error: invalid pattern \"{pattern}\"")),
                Ok(re) if re.is_match(output) => None,
                Ok(_) => Some(format!("Output does not match pattern \"{pattern}\"")),
            },
        },
        RuleType::JsonSchema => check_json_schema(output, &rule.value),
        RuleType::IsJson => {
            let candidate = strip_code_fence(output);
            if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                return None;
            }
            Some("Output is not valid JSON".to_string())
        }
        RuleType::ContainsJson => {
            if find_json_fragment(output).is_some() {
                return None;
            }
            Some("Output does not contain valid JSON".to_string())
        }
        RuleType::MaxResponseTime => {
            // Skipped entirely when no response time was measured.
            let actual = response_time_ms?;
            match as_number(&rule.value) {
                None => Some(malformed("maxResponseTime", "numeric")),
                Some(limit) if (actual as f64) <= limit => None,
                Some(limit) => {
                    Some(format!("Response time {actual}ms exceeded limit {limit}ms"))
                }
            }
        }
    }
}

fn malformed(rule_name: &str, expected: &str) -> String {
    format!("Invalid {rule_name} rule: expected a {expected} value")
}

fn as_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn check_json_schema(output: &str, schema_value: &serde_json::Value) -> Option<String> {
    // The schema may arrive as an embedded JSON string or as a document.
    let schema = match schema_value {
        serde_json::Value::String(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(parsed) => parsed,
            Err(_) => return Some("Invalid JSON schema".to_string()),
        },
        other => other.clone(),
    };

    let instance = match serde_json::from_str::<serde_json::Value>(strip_code_fence(output)) {
        Ok(v) => v,
        Err(_) => return Some("Output is not valid JSON".to_string()),
    };

    match jsonschema::validator_for(&schema) {
        Err(_) => Some("Invalid JSON schema".to_string()),
        Ok(validator) if validator.is_valid(&instance) => None,
        Ok(_) => Some("Output does not match JSON schema".to_string()),
    }
}

// ============================================================================
// JSON extraction helpers
// ============================================================================

/// Strip one outer fenced code block, with or without a language tag.
/// Non-fenced input comes back trimmed and otherwise untouched.
pub(crate) fn strip_code_fence(output: &str) -> &str {
    let trimmed = output.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(end) = rest.rfind("```") {
            let inner = &rest[..end];
            // Drop the language tag line when present.
            let inner = match inner.find('\n') {
                Some(idx) => &inner[idx + 1..],
                None => inner,
            };
            return inner.trim();
        }
    }
    trimmed
}

/// Locate a parseable JSON object/array inside mixed text. A fenced code
/// block is preferred; otherwise the first balanced `{...}`/`[...]` span
/// that parses wins.
pub(crate) fn find_json_fragment(output: &str) -> Option<String> {
    let fenced = strip_code_fence(output);
    if fenced != output.trim() && serde_json::from_str::<serde_json::Value>(fenced).is_ok() {
        return Some(fenced.to_string());
    }

    for (start, ch) in output.char_indices() {
        if ch == '{' || ch == '[' {
            if let Some(fragment) = balanced_slice(&output[start..]) {
                if serde_json::from_str::<serde_json::Value>(fragment).is_ok() {
                    return Some(fragment.to_string());
                }
            }
        }
    }
    None
}

/// Span from the opening delimiter to its matching close, honoring string
/// literals and escapes. `None` when the input ends unbalanced.
fn balanced_slice(s: &str) -> Option<&str> {
    let open = s.chars().next()?;
    let close = match open {
        '{' => '}',
        '[' => ']',
        _ => return None,
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            c if !in_string && c == open => depth += 1,
            c if !in_string && c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..idx + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
