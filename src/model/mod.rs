pub mod comparison;
pub mod target;
pub mod test_case;
pub mod test_run;

pub use comparison::{CaseStatus, ComparisonSummary, RunComparison, TestCaseComparison};
pub use target::{
    Credentials, EndpointTarget, HttpMethod, JudgeConfig, MessageTemplate, ModelOverride,
    PromptTarget, TestTarget,
};
pub use test_case::{RuleSeverity, RuleType, TestCase, ValidationMode, ValidationRule};
pub use test_run::{RunStatus, TestResult, TestRun, TestRunSummary};
