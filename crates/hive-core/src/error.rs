//! Error kinds for the graph execution engine.
//!
//! Every variant corresponds to one of the dotted error-kind namespaces
//! the runtime records on an `Attempt` or `FailureRecord`.

use thiserror::Error;

/// Dotted error-kind namespace, stable across process restarts.
///
/// Used as the `error_kind` component of a `FailureRecord` fingerprint, so
/// the `Display` impl must never change for a given variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    GraphInvalid,
    GraphDeadEnd,
    ContractMissingInput,
    ContractUndeclaredOutput,
    LlmInvalidJson,
    LlmMissingOutput,
    LlmHallucinationDetected,
    LlmTimeout,
    LlmProviderError,
    ToolNotPermitted,
    ToolTimeout,
    ToolError,
    FunctionException,
    RunCancelled,
    RunPaused,
    StorageUnavailable,
}

impl ErrorKind {
    /// Whether the default retry policy (spec.md §4.2, §4.4.6) treats this
    /// kind as retriable absent any more specific evidence-based override.
    pub fn default_retriable(self) -> bool {
        !matches!(
            self,
            ErrorKind::GraphInvalid
                | ErrorKind::GraphDeadEnd
                | ErrorKind::ToolNotPermitted
                | ErrorKind::RunCancelled
                | ErrorKind::RunPaused
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::GraphInvalid => "graph.invalid",
            ErrorKind::GraphDeadEnd => "graph.dead_end",
            ErrorKind::ContractMissingInput => "contract.missing_input",
            ErrorKind::ContractUndeclaredOutput => "contract.undeclared_output",
            ErrorKind::LlmInvalidJson => "llm.invalid_json",
            ErrorKind::LlmMissingOutput => "llm.missing_output",
            ErrorKind::LlmHallucinationDetected => "llm.hallucination_detected",
            ErrorKind::LlmTimeout => "llm.timeout",
            ErrorKind::LlmProviderError => "llm.provider_error",
            ErrorKind::ToolNotPermitted => "tool.not_permitted",
            ErrorKind::ToolTimeout => "tool.timeout",
            ErrorKind::ToolError => "tool.error",
            ErrorKind::FunctionException => "function.exception",
            ErrorKind::RunCancelled => "run.cancelled",
            ErrorKind::RunPaused => "run.paused",
            ErrorKind::StorageUnavailable => "storage.unavailable",
        };
        write!(f, "{s}")
    }
}

/// Structured error carried on an `Attempt` and surfaced on `ExecutionResult`.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("{kind}: {message}")]
pub struct HiveError {
    pub kind: ErrorKind,
    pub message: String,
    pub stack: Option<String>,
}

impl HiveError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.default_retriable()
    }
}

pub type Result<T> = std::result::Result<T, HiveError>;
