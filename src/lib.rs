//! Test execution and comparison engine for LLM prompts and HTTP endpoints.
//!
//! The engine takes already-authorized, already-loaded inputs — a target
//! definition, resolved provider credentials, test cases, and validation
//! rules — executes the cases against one of several model providers (or a
//! raw HTTP target), validates the outputs, and can diff two completed runs
//! to detect regressions. It persists nothing and knows nothing about
//! sessions, roles, or organizations.
//!
//! Main entry points:
//! - [`runner::run_suite`] — batch execution returning a completed `TestRun`
//! - [`stream::stream_run`] — the same run delivered as typed events with
//!   heartbeats and cooperative cancellation
//! - [`compare::compare`] — pure diff of two completed runs
//! - [`validation::validate`] — the rule evaluator, usable standalone

pub mod compare;
pub mod error;
pub mod executor;
pub mod judge;
pub mod logging;
pub mod model;
pub mod provider;
pub mod runner;
pub mod stream;
pub mod template;
pub mod validation;

pub use compare::compare;
pub use error::EngineError;
pub use executor::{execute_case, CaseExecution};
pub use model::{
    CaseStatus, ComparisonSummary, Credentials, EndpointTarget, HttpMethod, JudgeConfig,
    MessageTemplate, ModelOverride, PromptTarget, RuleSeverity, RuleType, RunComparison,
    RunStatus, TestCase, TestCaseComparison, TestResult, TestRun, TestRunSummary, TestTarget,
    ValidationMode, ValidationRule,
};
pub use provider::{
    resolve_provider, ChatMessage, CompletionRequest, CompletionResult, Provider, ProviderError,
    ProviderKind, Role, TokenUsage,
};
pub use runner::{run_suite, RunRequest, DEFAULT_MAX_CONCURRENCY, MAX_ITERATIONS};
pub use stream::{stream_run, RunEvent, HEARTBEAT_INTERVAL};
pub use validation::{validate, ValidationOutcome};
