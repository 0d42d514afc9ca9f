use crate::provider::ProviderError;

/// Engine-wide error type. Every fallible entry point returns
/// `Result<T, EngineError>`.
///
/// Only precondition failures surface here: per-case provider failures and
/// validation failures are recorded on the `TestResult` instead and never
/// unwind a run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("No test cases match the requested filter")]
    NoMatchingCases,

    #[error("No enabled test cases to run")]
    NoEnabledCases,

    #[error("Missing credentials for provider: {0}")]
    MissingCredentials(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}
