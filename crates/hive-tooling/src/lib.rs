//! In-process `ToolExecutor` (spec.md §6 collaborator) and a handful of
//! reference tools. The tool catalogue itself (web scrape, CRM, ...) is out
//! of scope for the core crate; this crate is where a deployment registers
//! its own named tools the way the teacher's tooling crate's `tools` module
//! groups concrete implementations, and enforces the per-call timeout
//! around each dispatch the way its `async_utils::timeout` helpers do.

pub mod registry;
pub mod tools;

pub use registry::{NamedToolExecutor, Tool, ToolError};
