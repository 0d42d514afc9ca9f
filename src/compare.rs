//! Run comparison: diff two completed runs per test case and classify each
//! case as improved, regressed, unchanged, new, or removed.
//!
//! Pure function of its two inputs; no network or storage access.

use std::collections::{HashMap, HashSet};

use crate::model::comparison::{CaseStatus, ComparisonSummary, RunComparison, TestCaseComparison};
use crate::model::test_run::{TestResult, TestRun};

/// Score movement below or at this magnitude counts as unchanged. The
/// threshold is strict: a delta of exactly 0.05 is unchanged.
pub const SCORE_DELTA_THRESHOLD: f64 = 0.05;

/// Diff `compare_run` against `baseline_run`.
///
/// Pass-state transitions win: fail→pass is improved and pass→fail is
/// regressed regardless of scores. Only when the pass-state is unchanged
/// does the judge-score delta classify the case.
pub fn compare(baseline_run: &TestRun, compare_run: &TestRun) -> RunComparison {
    let baseline_index = index_by_case(&baseline_run.results);
    let compare_index = index_by_case(&compare_run.results);

    // Deterministic output ordering: baseline order first, then
    // compare-only cases in compare order.
    let mut ordered_ids: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for result in baseline_run.results.iter().chain(compare_run.results.iter()) {
        if seen.insert(result.test_case_id.as_str()) {
            ordered_ids.push(result.test_case_id.as_str());
        }
    }

    let mut summary = ComparisonSummary::default();
    let mut test_cases = Vec::with_capacity(ordered_ids.len());

    for id in ordered_ids {
        let comparison = match (baseline_index.get(id), compare_index.get(id)) {
            (None, Some(compared)) => TestCaseComparison {
                test_case_id: id.to_string(),
                test_case_name: compared.test_case_name.clone(),
                status: CaseStatus::New,
                score_delta: None,
                response_time_delta: None,
            },
            (Some(base), None) => TestCaseComparison {
                test_case_id: id.to_string(),
                test_case_name: base.test_case_name.clone(),
                status: CaseStatus::Removed,
                score_delta: None,
                response_time_delta: None,
            },
            (Some(base), Some(compared)) => {
                let score_delta = match (base.judge_score, compared.judge_score) {
                    (Some(b), Some(c)) => Some(shed_noise(c - b)),
                    _ => None,
                };
                TestCaseComparison {
                    test_case_id: id.to_string(),
                    test_case_name: compared.test_case_name.clone(),
                    status: classify(base, compared, score_delta),
                    score_delta,
                    response_time_delta: Some(
                        compared.response_time_ms as i64 - base.response_time_ms as i64,
                    ),
                }
            }
            (None, None) => continue,
        };

        match comparison.status {
            CaseStatus::Improved => summary.improved += 1,
            CaseStatus::Regressed => summary.regressed += 1,
            CaseStatus::Unchanged => summary.unchanged += 1,
            CaseStatus::New => summary.new += 1,
            CaseStatus::Removed => summary.removed += 1,
        }
        test_cases.push(comparison);
    }

    summary.pass_rate_delta = round_pct(
        compare_run.summary.pass_rate() - baseline_run.summary.pass_rate(),
    );
    summary.avg_score_delta = match (
        baseline_run.summary.avg_score,
        compare_run.summary.avg_score,
    ) {
        (Some(b), Some(c)) => Some(round_pct(c - b)),
        _ => None,
    };
    summary.avg_response_time_delta =
        compare_run.summary.avg_response_time - baseline_run.summary.avg_response_time;

    RunComparison { summary, test_cases }
}

/// Index results by test case, last-write-wins on duplicates.
fn index_by_case(results: &[TestResult]) -> HashMap<&str, &TestResult> {
    let mut index = HashMap::with_capacity(results.len());
    for result in results {
        index.insert(result.test_case_id.as_str(), result);
    }
    index
}

fn classify(base: &TestResult, compared: &TestResult, score_delta: Option<f64>) -> CaseStatus {
    match (base.validation_passed, compared.validation_passed) {
        (false, true) => CaseStatus::Improved,
        (true, false) => CaseStatus::Regressed,
        _ => match score_delta {
            Some(delta) if delta > SCORE_DELTA_THRESHOLD => CaseStatus::Improved,
            Some(delta) if delta < -SCORE_DELTA_THRESHOLD => CaseStatus::Regressed,
            _ => CaseStatus::Unchanged,
        },
    }
}

/// Drop float representation noise so a nominal 0.05 delta sits exactly at
/// the threshold instead of a hair above it.
fn shed_noise(delta: f64) -> f64 {
    (delta * 1e9).round() / 1e9
}

/// Fraction delta -> percentage points with one decimal.
fn round_pct(delta: f64) -> f64 {
    (delta * 1000.0).round() / 10.0
}
