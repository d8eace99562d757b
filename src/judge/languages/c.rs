//! C language adapter

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{LanguageAdapter, native_run};
use crate::judge::sandbox::SandboxCommand;
use crate::judge::workspace::Workspace;
use crate::models::{LanguageId, ResourceLimits};

/// gcc, C11, statically optimised
#[derive(Debug, Clone)]
pub struct CAdapter {
    compiler: String,
}

impl CAdapter {
    pub fn new(compiler: impl Into<String>) -> Self {
        Self {
            compiler: compiler.into(),
        }
    }
}

#[async_trait]
impl LanguageAdapter for CAdapter {
    fn language(&self) -> LanguageId {
        LanguageId::C
    }

    fn source_file_name(&self, _code: &str) -> String {
        "solution.c".to_string()
    }

    fn compile_command(&self, workspace: &Workspace) -> Option<SandboxCommand> {
        Some(
            SandboxCommand::new(&self.compiler, workspace.path())
                .args(["-O2", "-std=c11", "-Wall", "-o"])
                .arg(self.artifact_path(workspace))
                .arg(workspace.source_path())
                .arg("-lm"),
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
