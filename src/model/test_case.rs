use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Validation rules
// ============================================================================

/// Declarative check applied to a test output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleType {
    Contains,
    Excludes,
    MinLength,
    MaxLength,
    Regex,
    JsonSchema,
    MaxResponseTime,
    IsJson,
    ContainsJson,
}

/// Severity is informational only: a failing `Warning` rule still fails
/// validation. Callers that want soft warnings filter on severity themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    #[default]
    Fail,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    /// String for text rules, number for length/time limits.
    pub value: serde_json::Value,
    /// Caller-supplied message that replaces the default verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: RuleSeverity,
}

impl ValidationRule {
    pub fn new(rule_type: RuleType, value: impl Into<serde_json::Value>) -> Self {
        Self {
            rule_type,
            value: value.into(),
            message: None,
            severity: RuleSeverity::Fail,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_severity(mut self, severity: RuleSeverity) -> Self {
        self.severity = severity;
        self
    }
}

// ============================================================================
// Test cases
// ============================================================================

/// How a test case's output is checked: `Text` derives a containment check
/// from `expected_output`, `Rules` relies on the explicit rule list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    #[default]
    Text,
    Rules,
}

/// One named input/expectation unit to execute against a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub name: String,
    /// Variable name -> value, substituted into `{{variable}}` placeholders.
    #[serde(default)]
    pub inputs: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub validation_mode: ValidationMode,
    /// Case-level rules, appended to the suite-level rule list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_rules: Vec<ValidationRule>,
    /// Case-level judge criteria, appended to the judge config's criteria.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub judge_rules: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl TestCase {
    /// Minimal case for construction sites that fill fields incrementally.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            inputs: HashMap::new(),
            expected_output: None,
            tags: Vec::new(),
            enabled: true,
            validation_mode: ValidationMode::default(),
            validation_rules: Vec::new(),
            judge_rules: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_type_serializes_camel_case() {
        let json = serde_json::to_string(&RuleType::MaxResponseTime).unwrap();
        assert_eq!(json, r#""maxResponseTime""#);
        let json = serde_json::to_string(&RuleType::IsJson).unwrap();
        assert_eq!(json, r#""isJson""#);
    }

    #[test]
    fn test_rule_deserializes_with_defaults() {
        let rule: ValidationRule =
            serde_json::from_str(r#"{"type":"contains","value":"hello"}"#).unwrap();
        assert_eq!(rule.rule_type, RuleType::Contains);
        assert_eq!(rule.severity, RuleSeverity::Fail);
        assert!(rule.message.is_none());
    }

    #[test]
    fn test_case_enabled_defaults_true() {
        let case: TestCase = serde_json::from_str(r#"{"id":"tc-1","name":"first"}"#).unwrap();
        assert!(case.enabled);
        assert_eq!(case.validation_mode, ValidationMode::Text);
        assert!(case.tags.is_empty());
    }

    #[test]
    fn test_case_round_trips() {
        let mut case = TestCase::new("tc-1", "greeting");
        case.inputs.insert("city".into(), "Prague".into());
        case.tags.push("smoke".into());
        case.expected_output = Some("Hello".into());

        let json = serde_json::to_string(&case).unwrap();
        let back: TestCase = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "tc-1");
        assert_eq!(back.inputs.get("city").map(String::as_str), Some("Prague"));
        assert_eq!(back.expected_output.as_deref(), Some("Hello"));
    }
}
