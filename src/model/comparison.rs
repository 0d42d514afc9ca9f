use serde::{Deserialize, Serialize};

// ============================================================================
// Run comparison entities
// ============================================================================

/// How a test case moved between a baseline run and a compare run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Improved,
    Regressed,
    Unchanged,
    /// Present only in the compare run.
    New,
    /// Present only in the baseline run.
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseComparison {
    pub test_case_id: String,
    pub test_case_name: String,
    pub status: CaseStatus,
    /// compare − baseline judge score, when both sides reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_delta: Option<f64>,
    /// compare − baseline response time in ms, for every matched pair.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_delta: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    pub improved: usize,
    pub regressed: usize,
    pub unchanged: usize,
    pub new: usize,
    pub removed: usize,
    /// Percentage-point delta with one decimal.
    pub pass_rate_delta: f64,
    /// Percentage-point delta with one decimal; present only when both runs
    /// report an average score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_score_delta: Option<f64>,
    pub avg_response_time_delta: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunComparison {
    pub summary: ComparisonSummary,
    pub test_cases: Vec<TestCaseComparison>,
}
