//! Language adapters
//!
//! One adapter per language knows the source file convention, how to compile
//! and how to run the artifact. The orchestrator and the sandbox never branch
//! on the language; adding one means adding an adapter and registering it.

pub mod c;
pub mod cpp;
pub mod go;
pub mod java;
pub mod python;
pub mod rust;

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::ToolchainConfig;
use crate::constants::MAX_DIAGNOSTICS_CHARS;
use crate::error::{AppResult, JudgeError};
use crate::judge::output::to_text;
use crate::judge::sandbox::{ExecutionResult, ProcessRunner, SandboxCommand};
use crate::judge::workspace::Workspace;
use crate::models::{LanguageId, ResourceLimits};

/// Outcome of the compile step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileResult {
    pub artifact_path: PathBuf,
    pub success: bool,
    /// Compiler output shown to the submitter on failure
    pub diagnostics: String,
}

/// Per-language compile and run strategy
#[async_trait]
pub trait LanguageAdapter: Send + Sync + Debug {
    fn language(&self) -> LanguageId;

    /// File name the toolchain expects for `code`
    fn source_file_name(&self, code: &str) -> String;

    /// Toolchain invocation; `None` for interpreted languages
    fn compile_command(&self, workspace: &Workspace) -> Option<SandboxCommand>;

    /// What `run_command` executes: a binary, class directory or script
    fn artifact_path(&self, workspace: &Workspace) -> PathBuf;

    fn run_command(
        &self,
        workspace: &Workspace,
        artifact: &Path,
        limits: &ResourceLimits,
    ) -> SandboxCommand;

    /// Compile inside the sandbox under the compile-specific `limits`.
    ///
    /// A failing or timed-out toolchain is a failed [`CompileResult`]; only a
    /// toolchain that cannot be started is an error.
    async fn compile(
        &self,
        workspace: &Workspace,
        runner: &dyn ProcessRunner,
        limits: &ResourceLimits,
        cancel: &CancellationToken,
    ) -> AppResult<CompileResult> {
        let artifact_path = self.artifact_path(workspace);
        let Some(command) = self.compile_command(workspace) else {
            return Ok(CompileResult {
                artifact_path,
                success: true,
                diagnostics: String::new(),
            });
        };

        let result = runner.execute(&command, limits, cancel).await?;
        Ok(CompileResult {
            artifact_path,
            success: result.is_success(),
            diagnostics: compile_diagnostics(&result, limits),
        })
    }

    /// Run the artifact with stdin redirected from `input`
    async fn run(
        &self,
        workspace: &Workspace,
        artifact: &Path,
        input: Option<PathBuf>,
        runner: &dyn ProcessRunner,
        limits: &ResourceLimits,
        cancel: &CancellationToken,
    ) -> AppResult<ExecutionResult> {
        let command = self
            .run_command(workspace, artifact, limits)
            .stdin_from(input);
        runner.execute(&command, limits, cancel).await
    }
}

/// Compiler stderr followed by stdout, plus a note when a limit stopped it
fn compile_diagnostics(result: &ExecutionResult, limits: &ResourceLimits) -> String {
    let mut text = to_text(&result.stderr, MAX_DIAGNOSTICS_CHARS);
    let stdout = to_text(&result.stdout, MAX_DIAGNOSTICS_CHARS);
    if !stdout.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stdout);
    }
    if result.timed_out {
        text.push_str(&format!(
            "\nCompilation exceeded the {} ms time limit",
            limits.wall_time_ms
        ));
    } else if result.memory_exceeded {
        text.push_str(&format!(
            "\nCompilation exceeded the {} KB memory limit",
            limits.memory_kb
        ));
    }
    text
}

/// Run a natively compiled artifact directly
fn native_run(workspace: &Workspace, artifact: &Path) -> SandboxCommand {
    SandboxCommand::new(artifact, workspace.path())
}

/// Lookup from language to adapter
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    adapters: HashMap<LanguageId, Arc<dyn LanguageAdapter>>,
}

impl LanguageRegistry {
    /// Registry with every built-in adapter
    pub fn with_defaults(toolchains: &ToolchainConfig) -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(c::CAdapter::new(&toolchains.cc)));
        registry.register(Arc::new(cpp::CppAdapter::new(&toolchains.cxx)));
        registry.register(Arc::new(java::JavaAdapter::new(
            &toolchains.javac,
            &toolchains.java,
        )));
        registry.register(Arc::new(python::PythonAdapter::new(&toolchains.python)));
        registry.register(Arc::new(rust::RustAdapter::new(&toolchains.rustc)));
        registry.register(Arc::new(go::GoAdapter::new(&toolchains.go)));
        registry
    }

    /// Add or replace the adapter for its language
    pub fn register(&mut self, adapter: Arc<dyn LanguageAdapter>) {
        self.adapters.insert(adapter.language(), adapter);
    }

    pub fn adapter_for(&self, language: LanguageId) -> AppResult<Arc<dyn LanguageAdapter>> {
        self.adapters
            .get(&language)
            .cloned()
            .ok_or_else(|| JudgeError::UnsupportedLanguage(language.to_string()))
    }

    /// Registered languages, sorted
    pub fn languages(&self) -> Vec<LanguageId> {
        let mut languages: Vec<_> = self.adapters.keys().copied().collect();
        languages.sort();
        languages
    }
}
