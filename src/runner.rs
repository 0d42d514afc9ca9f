//! Execution orchestration: resolves the test-case set, fans the executor
//! out over cases × iterations — sequentially or under a bounded worker
//! pool — and aggregates the run.
//!
//! State machine per run: `running → completed`, `running → incomplete` when
//! cancellation truncated an otherwise-successful run, `running → failed`
//! when cancellation salvaged nothing.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::executor::{execute_case, CaseExecution};
use crate::model::target::{Credentials, JudgeConfig, ModelOverride, TestTarget};
use crate::model::test_case::{TestCase, ValidationRule};
use crate::model::test_run::{RunStatus, TestResult, TestRun, TestRunSummary};
use crate::provider::ProviderKind;
use crate::stream::RunEvent;

/// Worker-pool ceiling when the caller does not configure one.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Iteration counts clamp into [1, MAX_ITERATIONS].
pub const MAX_ITERATIONS: u32 = 100;

/// Run notes are trimmed, then hard-truncated to this many characters.
pub const MAX_NOTE_LENGTH: usize = 500;

// =============================================================================
// RunRequest
// =============================================================================

/// Everything the orchestrator needs, handed in by the (excluded)
/// persistence/auth layer: target, cases, rules, judge config, resolved
/// credentials, and run options.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub target: TestTarget,
    pub test_cases: Vec<TestCase>,
    pub validation_rules: Vec<ValidationRule>,
    pub judge: JudgeConfig,
    pub credentials: Credentials,
    pub model_override: Option<ModelOverride>,
    pub note: Option<String>,
    pub iterations: Option<u32>,
    /// Tag filter, OR semantics across tags. Ignored when `test_case_ids`
    /// is present.
    pub tags: Option<Vec<String>>,
    /// Explicit ID filter; takes precedence over `tags`.
    pub test_case_ids: Option<Vec<String>>,
    pub parallel: bool,
    pub max_concurrency: Option<usize>,
}

impl RunRequest {
    pub fn new(target: TestTarget, test_cases: Vec<TestCase>) -> Self {
        Self {
            target,
            test_cases,
            validation_rules: Vec::new(),
            judge: JudgeConfig::default(),
            credentials: Credentials::new(),
            model_override: None,
            note: None,
            iterations: None,
            tags: None,
            test_case_ids: None,
            parallel: false,
            max_concurrency: None,
        }
    }
}

// =============================================================================
// Public entry points
// =============================================================================

/// Batch execution: runs to completion and returns the finished `TestRun`.
pub async fn run_suite(
    request: RunRequest,
    cancel: CancellationToken,
) -> Result<TestRun, EngineError> {
    run_internal(request, cancel, None).await
}

/// Streaming execution: same semantics as `run_suite`, but emits progress,
/// result, and error events into `events` as units complete. The terminal
/// `complete` event is the caller's responsibility (see `stream::stream_run`).
pub(crate) async fn run_streaming(
    request: RunRequest,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<RunEvent>,
) -> Result<TestRun, EngineError> {
    run_internal(request, cancel, Some(events)).await
}

// =============================================================================
// Orchestration
// =============================================================================

/// Shared, read-only context for worker tasks.
struct RunContext {
    target: TestTarget,
    cases: Vec<TestCase>,
    validation_rules: Vec<ValidationRule>,
    judge: JudgeConfig,
    credentials: Credentials,
    model_override: Option<ModelOverride>,
    iterations: u32,
}

/// One `(iteration, case)` execution unit. Iterations are flattened into the
/// same work queue, never run as nested parallel loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WorkUnit {
    /// 1-based pass number.
    iteration: u32,
    case_index: usize,
}

async fn run_internal(
    request: RunRequest,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
) -> Result<TestRun, EngineError> {
    // Preconditions abort before any execution starts.
    validate_target(&request.target)?;
    let cases = select_cases(
        &request.test_cases,
        request.test_case_ids.as_deref(),
        request.tags.as_deref(),
    )?;
    check_credentials(&request)?;

    let iterations = clamp_iterations(request.iterations);
    let note = request
        .note
        .as_deref()
        .map(normalize_note)
        .filter(|n| !n.is_empty());
    let model_override = request.model_override.clone();

    let run_id = uuid::Uuid::new_v4().to_string();
    let run_at = chrono::Utc::now().to_rfc3339();
    let units = build_units(cases.len(), iterations);
    let total = units.len();

    tracing::info!(
        run_id = %run_id,
        cases = cases.len(),
        iterations,
        parallel = request.parallel,
        "Starting test run"
    );

    emit(
        events.as_ref(),
        RunEvent::Connected { run_id: run_id.clone(), total },
    );

    let ctx = Arc::new(RunContext {
        target: request.target,
        cases,
        validation_rules: request.validation_rules,
        judge: request.judge,
        credentials: request.credentials,
        model_override: request.model_override,
        iterations,
    });

    let (results, cancelled) = if request.parallel {
        let max_concurrency = request
            .max_concurrency
            .unwrap_or(DEFAULT_MAX_CONCURRENCY)
            .max(1);
        run_parallel(ctx, units, max_concurrency, cancel, events.as_ref()).await
    } else {
        run_sequential(ctx, units, cancel, events.as_ref()).await
    };

    let status = if cancelled {
        if results.is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Incomplete
        }
    } else {
        RunStatus::Completed
    };

    let summary = TestRunSummary::aggregate(&results);
    tracing::info!(
        run_id = %run_id,
        status = ?status,
        passed = summary.passed,
        failed = summary.failed,
        "Test run finished"
    );

    Ok(TestRun {
        id: run_id,
        run_at,
        status,
        results,
        summary,
        note,
        model_override,
        iterations: (iterations > 1).then_some(iterations),
    })
}

/// One case at a time, list order, iteration passes in order.
async fn run_sequential(
    ctx: Arc<RunContext>,
    units: Vec<WorkUnit>,
    cancel: CancellationToken,
    events: Option<&mpsc::UnboundedSender<RunEvent>>,
) -> (Vec<TestResult>, bool) {
    let total = units.len();
    let mut results = Vec::with_capacity(total);
    let mut cancelled = false;

    for unit in units {
        // Cooperative cancellation: checked between units only, so an
        // in-flight call always finishes and keeps its result.
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let result = run_unit(&ctx, unit).await;
        publish(events, &result, results.len() + 1, total);
        results.push(result);
    }

    (results, cancelled)
}

/// Fixed-size worker pool over one shared queue. Workers have no shared
/// mutable state beyond the queue; the collector loop below is the single
/// writer into the results list.
async fn run_parallel(
    ctx: Arc<RunContext>,
    units: Vec<WorkUnit>,
    max_concurrency: usize,
    cancel: CancellationToken,
    events: Option<&mpsc::UnboundedSender<RunEvent>>,
) -> (Vec<TestResult>, bool) {
    let total = units.len();
    let queue = Arc::new(Mutex::new(VecDeque::from(units)));
    let (tx, mut rx) = mpsc::unbounded_channel::<TestResult>();

    let workers = max_concurrency.min(total).max(1);
    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let queue = Arc::clone(&queue);
        let ctx = Arc::clone(&ctx);
        let cancel = cancel.clone();
        let tx = tx.clone();
        handles.push(tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let unit = queue.lock().await.pop_front();
                let Some(unit) = unit else { break };
                let result = run_unit(&ctx, unit).await;
                if tx.send(result).is_err() {
                    break;
                }
            }
        }));
    }
    drop(tx);

    let mut results = Vec::with_capacity(total);
    while let Some(result) = rx.recv().await {
        publish(events, &result, results.len() + 1, total);
        results.push(result);
    }
    for handle in handles {
        let _ = handle.await;
    }

    let cancelled = cancel.is_cancelled() && results.len() < total;
    (results, cancelled)
}

async fn run_unit(ctx: &RunContext, unit: WorkUnit) -> TestResult {
    let exec = CaseExecution {
        test_case: &ctx.cases[unit.case_index],
        target: &ctx.target,
        validation_rules: &ctx.validation_rules,
        judge: &ctx.judge,
        credentials: &ctx.credentials,
        model_override: ctx.model_override.as_ref(),
    };
    let mut result = execute_case(&exec).await;
    if ctx.iterations > 1 {
        result.iteration = Some(unit.iteration);
    }
    result
}

fn emit(events: Option<&mpsc::UnboundedSender<RunEvent>>, event: RunEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// Per-unit event fan-out: case-level faults become non-fatal `error`
/// events; every completed unit yields `progress` then `result`.
fn publish(
    events: Option<&mpsc::UnboundedSender<RunEvent>>,
    result: &TestResult,
    completed: usize,
    total: usize,
) {
    let Some(tx) = events else { return };
    if let Some(ref message) = result.error {
        let _ = tx.send(RunEvent::Error {
            message: message.clone(),
            test_case_id: Some(result.test_case_id.clone()),
        });
    }
    let _ = tx.send(RunEvent::Progress {
        completed,
        total,
        test_case_id: result.test_case_id.clone(),
        test_case_name: result.test_case_name.clone(),
        iteration: result.iteration,
    });
    let _ = tx.send(RunEvent::Result { result: result.clone() });
}

// =============================================================================
// Preconditions and filtering
// =============================================================================

fn validate_target(target: &TestTarget) -> Result<(), EngineError> {
    match target {
        TestTarget::Prompt(prompt) => {
            if prompt.model.trim().is_empty() {
                return Err(EngineError::InvalidTarget("prompt target has no model".into()));
            }
            if prompt.messages.is_empty() {
                return Err(EngineError::InvalidTarget("prompt target has no messages".into()));
            }
        }
        TestTarget::Endpoint(endpoint) => {
            if endpoint.url.trim().is_empty() {
                return Err(EngineError::InvalidTarget("endpoint target has no URL".into()));
            }
        }
    }
    Ok(())
}

/// Effective run provider: override wins over the prompt target's
/// configuration; endpoint targets have none.
fn effective_provider(request: &RunRequest) -> Option<ProviderKind> {
    if let Some(ref overridden) = request.model_override {
        return Some(overridden.provider);
    }
    match request.target {
        TestTarget::Prompt(ref prompt) => Some(prompt.provider),
        TestTarget::Endpoint(_) => None,
    }
}

/// Missing credentials are a precondition failure, never silently skipped.
fn check_credentials(request: &RunRequest) -> Result<(), EngineError> {
    if let Some(kind) = effective_provider(request) {
        request.credentials.require(kind)?;
    }
    if request.judge.enabled {
        if let Some(kind) = request.judge.provider.or(effective_provider(request)) {
            request.credentials.require(kind)?;
        }
    }
    Ok(())
}

/// Resolve the effective test-case set. Precedence: explicit ID filter >
/// tag filter (OR across tags) > full set; the enabled-flag filter applies
/// last in every path, with a distinct error per stage.
pub fn select_cases(
    all: &[TestCase],
    ids: Option<&[String]>,
    tags: Option<&[String]>,
) -> Result<Vec<TestCase>, EngineError> {
    let id_filter = ids.filter(|v| !v.is_empty());
    let tag_filter = tags.filter(|v| !v.is_empty());

    let matched: Vec<TestCase> = if let Some(ids) = id_filter {
        all.iter()
            .filter(|c| ids.iter().any(|id| *id == c.id))
            .cloned()
            .collect()
    } else if let Some(tags) = tag_filter {
        all.iter()
            .filter(|c| c.tags.iter().any(|t| tags.contains(t)))
            .cloned()
            .collect()
    } else {
        all.to_vec()
    };

    if matched.is_empty() && (id_filter.is_some() || tag_filter.is_some()) {
        return Err(EngineError::NoMatchingCases);
    }

    let enabled: Vec<TestCase> = matched.into_iter().filter(|c| c.enabled).collect();
    if enabled.is_empty() {
        return Err(EngineError::NoEnabledCases);
    }
    Ok(enabled)
}

fn clamp_iterations(requested: Option<u32>) -> u32 {
    requested.unwrap_or(1).clamp(1, MAX_ITERATIONS)
}

/// Trim, then hard-truncate to `MAX_NOTE_LENGTH` characters.
fn normalize_note(note: &str) -> String {
    note.trim().chars().take(MAX_NOTE_LENGTH).collect()
}

/// Iteration passes over the resolved set, flattened in pass order.
fn build_units(case_count: usize, iterations: u32) -> Vec<WorkUnit> {
    (1..=iterations)
        .flat_map(|iteration| {
            (0..case_count).map(move |case_index| WorkUnit { iteration, case_index })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_case(id: &str, tags: &[&str], enabled: bool) -> TestCase {
        let mut case = TestCase::new(id, format!("case {id}"));
        case.tags = tags.iter().map(|t| t.to_string()).collect();
        case.enabled = enabled;
        case
    }

    // ── select_cases ──

    #[test]
    fn test_full_set_when_no_filters() {
        let all = vec![make_case("a", &[], true), make_case("b", &[], true)];
        let selected = select_cases(&all, None, None).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_id_filter_takes_precedence_over_tags() {
        // IDs point at case A (tag X); the tag filter for X matches case B.
        // Only case A must be selected.
        let all = vec![make_case("a", &["x"], true), make_case("b", &["x"], true)];
        let ids = vec!["a".to_string()];
        let tags = vec!["x".to_string()];
        let selected = select_cases(&all, Some(&ids), Some(&tags)).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "a");
    }

    #[test]
    fn test_tag_filter_or_semantics() {
        let all = vec![
            make_case("a", &["x"], true),
            make_case("b", &["y"], true),
            make_case("c", &["z"], true),
        ];
        let tags = vec!["x".to_string(), "y".to_string()];
        let selected = select_cases(&all, None, Some(&tags)).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_no_matching_filter_is_distinct_error() {
        let all = vec![make_case("a", &[], true)];
        let ids = vec!["zzz".to_string()];
        let err = select_cases(&all, Some(&ids), None).unwrap_err();
        assert!(matches!(err, EngineError::NoMatchingCases));
    }

    #[test]
    fn test_enabled_filter_applies_after_id_filter() {
        // A matched-but-disabled case is excluded, and the resulting error
        // differs from the no-match error.
        let all = vec![make_case("a", &[], false)];
        let ids = vec!["a".to_string()];
        let err = select_cases(&all, Some(&ids), None).unwrap_err();
        assert!(matches!(err, EngineError::NoEnabledCases));
    }

    #[test]
    fn test_enabled_filter_applies_to_full_set() {
        let all = vec![make_case("a", &[], false), make_case("b", &[], true)];
        let selected = select_cases(&all, None, None).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "b");
    }

    #[test]
    fn test_empty_suite_reports_no_enabled_cases() {
        let err = select_cases(&[], None, None).unwrap_err();
        assert!(matches!(err, EngineError::NoEnabledCases));
    }

    // ── iterations ──

    #[test]
    fn test_iterations_default_and_clamp() {
        assert_eq!(clamp_iterations(None), 1);
        assert_eq!(clamp_iterations(Some(0)), 1);
        assert_eq!(clamp_iterations(Some(3)), 3);
        assert_eq!(clamp_iterations(Some(200)), 100);
    }

    #[test]
    fn test_build_units_flattens_iterations() {
        let units = build_units(3, 3);
        assert_eq!(units.len(), 9);
        // First pass covers every case in list order before pass two starts.
        assert_eq!(units[0], WorkUnit { iteration: 1, case_index: 0 });
        assert_eq!(units[2], WorkUnit { iteration: 1, case_index: 2 });
        assert_eq!(units[3], WorkUnit { iteration: 2, case_index: 0 });
        assert_eq!(units[8], WorkUnit { iteration: 3, case_index: 2 });
    }

    // ── note ──

    #[test]
    fn test_note_trimmed_and_truncated() {
        assert_eq!(normalize_note("  hello  "), "hello");
        let long = "x".repeat(600);
        assert_eq!(normalize_note(&long).chars().count(), 500);
    }

    // ── preconditions ──

    #[test]
    fn test_missing_credentials_is_precondition_error() {
        use crate::model::target::PromptTarget;

        let mut target = PromptTarget::new(ProviderKind::OpenAi, "gpt-4o");
        target.messages.push(crate::model::target::MessageTemplate::user("{{q}}"));
        let request = RunRequest::new(
            TestTarget::Prompt(target),
            vec![make_case("a", &[], true)],
        );
        let err = check_credentials(&request).unwrap_err();
        assert!(matches!(err, EngineError::MissingCredentials(_)));
    }

    #[test]
    fn test_override_provider_drives_credential_check() {
        use crate::model::target::PromptTarget;

        let mut target = PromptTarget::new(ProviderKind::OpenAi, "gpt-4o");
        target.messages.push(crate::model::target::MessageTemplate::user("{{q}}"));
        let mut request = RunRequest::new(
            TestTarget::Prompt(target),
            vec![make_case("a", &[], true)],
        );
        request.model_override = Some(ModelOverride {
            provider: ProviderKind::Groq,
            model: "llama-3.3-70b-versatile".into(),
        });
        request.credentials.insert(ProviderKind::OpenAi, "sk-unused");

        let err = check_credentials(&request).unwrap_err();
        assert!(err.to_string().contains("Groq"));
    }

    #[test]
    fn test_invalid_target_rejected() {
        use crate::model::target::{EndpointTarget, PromptTarget};

        let prompt = PromptTarget::new(ProviderKind::OpenAi, "  ");
        assert!(matches!(
            validate_target(&TestTarget::Prompt(prompt)),
            Err(EngineError::InvalidTarget(_))
        ));

        let endpoint = EndpointTarget::new("");
        assert!(matches!(
            validate_target(&TestTarget::Endpoint(endpoint)),
            Err(EngineError::InvalidTarget(_))
        ));
    }
}
