//! Python language adapter

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::LanguageAdapter;
use crate::judge::sandbox::SandboxCommand;
use crate::judge::workspace::Workspace;
use crate::models::{LanguageId, ResourceLimits};

/// CPython 3; nothing to compile, the script is the artifact
#[derive(Debug, Clone)]
pub struct PythonAdapter {
    interpreter: String,
}

impl PythonAdapter {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

#[async_trait]
impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> LanguageId {
        LanguageId::Python
    }

    fn source_file_name(&self, _code: &str) -> String {
        "solution.py".to_string()
    }

    fn compile_command(&self, _workspace: &Workspace) -> Option<SandboxCommand> {
        None
    }

    fn artifact_path(&self, workspace: &Workspace) -> PathBuf {
        workspace.source_path().to_path_buf()
    }

    fn run_command(
        &self,
        workspace: &Workspace,
        artifact: &Path,
        _limits: &ResourceLimits,
    ) -> SandboxCommand {
        // -B: no bytecode cache writes
        SandboxCommand::new(&self.interpreter, workspace.path())
            .arg("-B")
            .arg(artifact)
            .env("PYTHONIOENCODING", "utf-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::sandbox::MockProcessRunner;
    use crate::judge::workspace::WorkspaceManager;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_compile_is_a_no_op() {
        let root = tempfile::tempdir().unwrap();
        let adapter = PythonAdapter::new("python3");
        let ws = WorkspaceManager::new(root.path())
            .stage(uuid::Uuid::new_v4(), &adapter, "print(input())")
            .await
            .unwrap();

        let mut runner = MockProcessRunner::new();
        runner.expect_execute().never();
        let limits = ResourceLimits::new(1000, 1024).unwrap();

        let result = adapter
            .compile(&ws, &runner, &limits, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.artifact_path.as_path(), ws.source_path());
        assert!(result.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_run_passes_input_and_script() {
        let root = tempfile::tempdir().unwrap();
        let adapter = PythonAdapter::new("python3");
        let ws = WorkspaceManager::new(root.path())
            .stage(uuid::Uuid::new_v4(), &adapter, "print(input())")
            .await
            .unwrap();
        let input = ws.write_input(0, "5").await.unwrap();
        let script = ws.source_path().to_path_buf();

        let mut runner = MockProcessRunner::new();
        let expected_input = input.clone();
        runner
            .expect_execute()
            .withf(move |cmd, _, _| {
                cmd.program.as_path() == Path::new("python3")
                    && cmd.args.last().map(|a| a.as_os_str()) == Some(script.as_os_str())
                    && cmd.stdin == expected_input
            })
            .times(1)
            .returning(|_, _, _| Ok(crate::judge::sandbox::ExecutionResult::exited(0, "5\n")));

        let limits = ResourceLimits::new(1000, 1024).unwrap();
        let artifact = adapter.artifact_path(&ws);
        let result = adapter
            .run(&ws, &artifact, input, &runner, &limits, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.stdout, b"5\n");
    }
}
