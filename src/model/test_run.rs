use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::target::ModelOverride;

// ============================================================================
// Test results and runs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    /// Cancellation truncated an otherwise-successful run; results collected
    /// so far are kept.
    Incomplete,
}

/// Outcome of executing one test case once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test_case_id: String,
    pub test_case_name: String,
    #[serde(default)]
    pub inputs: HashMap<String, String>,
    pub output: String,
    pub validation_passed: bool,
    #[serde(default)]
    pub validation_errors: Vec<String>,
    /// Overall judge score in 0..1, when judge scoring ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge_score: Option<f64>,
    /// Per-criterion judge scores, when the judge reported a breakdown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge_scores: Option<HashMap<String, f64>>,
    pub response_time_ms: u64,
    /// Adapter/transport failure for this one case; does not abort the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 1-based pass number, set only when the run has iterations > 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Mean of judge-scored results only, rounded to 2 decimals; present
    /// only when at least one score exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_score: Option<f64>,
    pub avg_response_time: f64,
}

impl TestRunSummary {
    /// Aggregate a result list. Validation failures and per-case errors both
    /// count toward `failed`.
    pub fn aggregate(results: &[TestResult]) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.validation_passed).count();

        let avg_response_time = if total == 0 {
            0.0
        } else {
            results.iter().map(|r| r.response_time_ms as f64).sum::<f64>() / total as f64
        };

        let scores: Vec<f64> = results.iter().filter_map(|r| r.judge_score).collect();
        let avg_score = if scores.is_empty() {
            None
        } else {
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            Some((mean * 100.0).round() / 100.0)
        };

        Self {
            total,
            passed,
            failed: total - passed,
            avg_score,
            avg_response_time,
        }
    }

    /// Fraction of passing results in 0..1; 0 for an empty run.
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }
}

/// One complete execution of a suite's test cases. Owned and mutated only by
/// the orchestrator while `Running`; immutable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub id: String,
    pub run_at: String,
    pub status: RunStatus,
    pub results: Vec<TestResult>,
    pub summary: TestRunSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_override: Option<ModelOverride>,
    /// Present only when the run executed more than one pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
}
