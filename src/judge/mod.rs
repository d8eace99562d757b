//! Submission judging
//!
//! Workspace staging, per-language compilation, sandboxed execution and
//! verdict classification, tied together by [`JudgeRunner`].

pub mod classifier;
pub mod languages;
pub mod output;
mod process_tree;
pub mod runner;
pub mod sandbox;
pub mod workspace;

pub use classifier::{classify, outputs_match};
pub use languages::{CompileResult, LanguageAdapter, LanguageRegistry};
pub use runner::{JudgePhase, JudgeRunner};
#[cfg(test)]
pub use sandbox::MockProcessRunner;
pub use sandbox::{ExecutionResult, ExecutionSandbox, ProcessRunner, SandboxCommand};
pub use workspace::{Workspace, WorkspaceManager};
