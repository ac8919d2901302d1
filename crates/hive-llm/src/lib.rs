//! Reference `LLMProvider` implementations for hive.
//!
//! Vendor adapters are explicitly out of scope for the core crate; this
//! crate supplies the two providers every deployment still needs before it
//! picks a vendor: a deterministic scripted provider for tests and replay
//! fixtures, and a generic OpenAI-compatible HTTP client for local
//! development (Ollama, LM Studio, vLLM, and OpenAI itself all speak this
//! wire format).

pub mod http;
pub mod mock;

pub use http::{HttpLlmConfig, HttpLlmProvider};
pub use mock::{MockLlmProvider, ScriptedTurn};
