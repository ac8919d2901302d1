//! Goal-driven graph execution engine: a scheduler that walks a directed
//! graph of typed nodes on behalf of a declared `Goal`, enforcing retries,
//! output contracts, and a durable decision log along the way.
//!
//! Module map mirrors the component breakdown this crate implements:
//! `memory` (shared execution state), `decision` (the attempt log),
//! `failure` (deduplicated failure recording), `node` (the per-kind
//! execution kernel), `edge` (next-node selection), `executor` (the main
//! loop tying C1-C5 together), `events` (pub/sub), `runtime` (lifecycle and
//! triggers), `health` (liveness/readiness), and `replay` (deterministic
//! re-execution from a recorded decision log).

pub mod cancellation;
pub mod config;
pub mod decision;
pub mod edge;
pub mod error;
pub mod events;
pub mod executor;
pub mod failure;
pub mod function_registry;
pub mod goal;
pub mod graph;
pub mod health;
pub mod llm;
pub mod memory;
pub mod node;
pub mod replay;
pub mod runtime;
pub mod storage;
pub mod tool;

pub use cancellation::RunCancellation;
pub use config::{EventDropPolicy, HiveConfig};
pub use decision::{Attempt, AttemptStatus, DecisionLog, EvidenceType};
pub use edge::{AttemptOutcome, EdgeEvaluator};
pub use error::{ErrorKind, HiveError, Result};
pub use events::{EventBus, EventReceiver, HiveEvent};
pub use executor::{ExecutionResult, GraphExecutor};
pub use failure::{FailureDescriptor, FailureRecord, FailureRecorder, FailureRecorderHandle, FailureStats};
pub use function_registry::{Function, FunctionError, FunctionRegistry};
pub use goal::{Constraint, ConstraintKind, Goal, SuccessCriterion};
pub use graph::{EdgeCondition, EdgeSpec, GraphSpec, GraphValidation, NodeKind, NodeSpec, ValidationError, ValidationWarning};
pub use health::{HealthChecker, HealthReport, HealthStatus, Metrics, MetricsSnapshot};
pub use llm::{CompletionRequest, CompletionResponse, LLMProvider, Message, MessageRole, StreamChunk, ToolCall, ToolDescription, ToolTurn};
pub use memory::{MemorySnapshot, SharedMemory};
pub use replay::Replayer;
pub use runtime::{AgentRuntime, RunHandle, RuntimeState};
pub use storage::{FsStorage, NullStorage, RunSummary, Storage, ToolLogEntry};
pub use tool::{ToolExecutor, ToolOutcome};
