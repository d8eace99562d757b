//! Go language adapter

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{LanguageAdapter, native_run};
use crate::judge::sandbox::SandboxCommand;
use crate::judge::workspace::Workspace;
use crate::models::{LanguageId, ResourceLimits};

/// go build of a single file. Build cache and GOPATH live in the workspace.
#[derive(Debug, Clone)]
pub struct GoAdapter {
    toolchain: String,
}

impl GoAdapter {
    pub fn new(toolchain: impl Into<String>) -> Self {
        Self {
            toolchain: toolchain.into(),
        }
    }
}

#[async_trait]
impl LanguageAdapter for GoAdapter {
    fn language(&self) -> LanguageId {
        LanguageId::Go
    }

    fn source_file_name(&self, _code: &str) -> String {
        "solution.go".to_string()
    }

    fn compile_command(&self, workspace: &Workspace) -> Option<SandboxCommand> {
        Some(
            SandboxCommand::new(&self.toolchain, workspace.path())
                .args(["build", "-o"])
                .arg(self.artifact_path(workspace))
                .arg(workspace.source_path())
                .env("GOCACHE", workspace.join(".gocache"))
                .env("GOPATH", workspace.join(".gopath"))
                .env("GOTOOLCHAIN", "local")
                .env("CGO_ENABLED", "0")
                .address_space_limited(false),
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
        // The Go runtime reserves large virtual ranges up front.
        native_run(workspace, artifact).address_space_limited(false)
    }
}
