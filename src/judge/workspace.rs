//! Per-submission workspaces
//!
//! Each submission gets a freshly created, uniquely named directory under the
//! workspace root. The directory is owned by a [`tempfile::TempDir`], so it is
//! removed when the [`Workspace`] is dropped on any path, including unwinding
//! and cancellation; [`WorkspaceManager::cleanup`] removes it explicitly and
//! reports failures.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uuid::Uuid;

use crate::error::{AppResult, JudgeError};
use crate::judge::languages::LanguageAdapter;
use crate::models::LanguageId;

/// Staged submission directory
#[derive(Debug)]
pub struct Workspace {
    submission_id: Uuid,
    language: LanguageId,
    dir: TempDir,
    source_path: PathBuf,
}

impl Workspace {
    pub fn submission_id(&self) -> Uuid {
        self.submission_id
    }

    pub fn language(&self) -> LanguageId {
        self.language
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Path of `name` inside the workspace
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write the input of test `index` next to the source.
    ///
    /// Empty input writes nothing and yields `None`, which the sandbox runs
    /// with an empty stdin.
    pub async fn write_input(&self, index: usize, input: &str) -> AppResult<Option<PathBuf>> {
        if input.is_empty() {
            return Ok(None);
        }
        let path = self.join(format!("input_{index:03}.txt"));
        tokio::fs::write(&path, input)
            .await
            .map_err(|e| JudgeError::workspace(&path, e))?;
        Ok(Some(path))
    }
}

/// Allocates and removes submission workspaces
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the workspace for `submission_id` and write the source file
    /// under the name the adapter's toolchain expects.
    ///
    /// The directory name combines the submission id with a random suffix;
    /// nothing from the submitted code reaches the path except the source
    /// file name, which must be a bare file name.
    pub async fn stage(
        &self,
        submission_id: Uuid,
        adapter: &dyn LanguageAdapter,
        code: &str,
    ) -> AppResult<Workspace> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| JudgeError::workspace(&self.root, e))?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("sub-{submission_id}-"))
            .tempdir_in(&self.root)
            .map_err(|e| JudgeError::workspace(&self.root, e))?;

        let file_name = adapter.source_file_name(code);
        if Path::new(&file_name).file_name() != Some(OsStr::new(&file_name)) {
            return Err(JudgeError::Validation(format!(
                "invalid source file name: {file_name}"
            )));
        }

        let source_path = dir.path().join(&file_name);
        tokio::fs::write(&source_path, code)
            .await
            .map_err(|e| JudgeError::workspace(&source_path, e))?;

        tracing::debug!(
            submission_id = %submission_id,
            language = %adapter.language(),
            workspace = %dir.path().display(),
            source = %file_name,
            "Staged submission workspace"
        );

        Ok(Workspace {
            submission_id,
            language: adapter.language(),
            dir,
            source_path,
        })
    }

    /// Remove the workspace and everything in it
    pub async fn cleanup(&self, workspace: Workspace) -> AppResult<()> {
        let path = workspace.path().to_path_buf();
        let submission_id = workspace.submission_id();
        let language = workspace.language();
        let Workspace { dir, .. } = workspace;

        tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(anyhow::Error::from)?
            .map_err(|e| JudgeError::workspace(&path, e))?;

        tracing::debug!(
            submission_id = %submission_id,
            %language,
            workspace = %path.display(),
            "Removed submission workspace"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::languages::{java::JavaAdapter, python::PythonAdapter};

    fn entries(root: &Path) -> usize {
        std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_stage_writes_source_and_cleanup_removes_it() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let id = Uuid::new_v4();

        let ws = manager
            .stage(id, &PythonAdapter::new("python3"), "print(1)")
            .await
            .unwrap();
        assert!(ws.path().starts_with(root.path()));
        assert!(
            ws.path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(&format!("sub-{id}-"))
        );
        assert_eq!(std::fs::read_to_string(ws.source_path()).unwrap(), "print(1)");
        assert_eq!(ws.submission_id(), id);
        assert_eq!(ws.language(), LanguageId::Python);

        let dir = ws.path().to_path_buf();
        manager.cleanup(ws).await.unwrap();
        assert!(!dir.exists());
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_same_submission_gets_distinct_directories() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let id = Uuid::new_v4();
        let adapter = PythonAdapter::new("python3");

        let (a, b) = tokio::join!(
            manager.stage(id, &adapter, "a"),
            manager.stage(id, &adapter, "b")
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn test_source_name_follows_language_convention() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let code = "public class Solver { public static void main(String[] a) {} }";

        let ws = manager
            .stage(Uuid::new_v4(), &JavaAdapter::new("javac", "java"), code)
            .await
            .unwrap();
        assert_eq!(ws.source_path().file_name().unwrap(), "Solver.java");
    }

    #[tokio::test]
    async fn test_empty_input_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let ws = manager
            .stage(Uuid::new_v4(), &PythonAdapter::new("python3"), "pass")
            .await
            .unwrap();

        assert_eq!(ws.write_input(0, "").await.unwrap(), None);
        let path = ws.write_input(7, "1 2\n").await.unwrap().unwrap();
        assert_eq!(path.file_name().unwrap(), "input_007.txt");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "1 2\n");
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let ws = manager
            .stage(Uuid::new_v4(), &PythonAdapter::new("python3"), "pass")
            .await
            .unwrap();
        let dir = ws.path().to_path_buf();
        drop(ws);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_unwritable_root_is_workspace_error() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();
        let manager = WorkspaceManager::new(blocker.join("nested"));

        let err = manager
            .stage(Uuid::new_v4(), &PythonAdapter::new("python3"), "pass")
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::Workspace { .. }));
        assert_eq!(err.verdict(), crate::models::VerdictKind::InternalError);
    }
}
