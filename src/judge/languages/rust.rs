//! Rust language adapter

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{LanguageAdapter, native_run};
use crate::judge::sandbox::SandboxCommand;
use crate::judge::workspace::Workspace;
use crate::models::{LanguageId, ResourceLimits};

/// rustc, edition 2021, optimised
#[derive(Debug, Clone)]
pub struct RustAdapter {
    compiler: String,
}

impl RustAdapter {
    pub fn new(compiler: impl Into<String>) -> Self {
        Self {
            compiler: compiler.into(),
        }
    }
}

#[async_trait]
impl LanguageAdapter for RustAdapter {
    fn language(&self) -> LanguageId {
        LanguageId::Rust
    }

    fn source_file_name(&self, _code: &str) -> String {
        "solution.rs".to_string()
    }

    fn compile_command(&self, workspace: &Workspace) -> Option<SandboxCommand> {
        Some(
            SandboxCommand::new(&self.compiler, workspace.path())
                .args(["-O", "--edition", "2021", "-o"])
                .arg(self.artifact_path(workspace))
                .arg(workspace.source_path()),
        )
    }

    fn artifact_path(&self, workspace: &Workspace) -> PathBuf {
        workspace.join("solution")
    }

    fn run_command(
        &self,
        workspace: &Workspace,
        artifact: &Path,
        _limits: &ResourceLimits,
    ) -> SandboxCommand {
        native_run(workspace, artifact)
    }
}
