//! Reference tool implementations, grouped by concern the way the teacher's
//! `tools` module groups its filesystem tools.

pub mod echo;
pub mod filesystem;

pub use echo::EchoTool;
pub use filesystem::FsReadTool;
