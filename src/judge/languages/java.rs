//! Java language adapter

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::LanguageAdapter;
use crate::judge::sandbox::SandboxCommand;
use crate::judge::workspace::Workspace;
use crate::models::{LanguageId, ResourceLimits};

const DEFAULT_CLASS: &str = "Main";

/// Share of the memory limit given to the heap. The resident set also holds
/// metaspace, the code cache and thread stacks, all counted against the limit.
const HEAP_PERCENT: u64 = 75;

static PUBLIC_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*public\s+(?:(?:final|abstract|strictfp)\s+)*class\s+([A-Za-z_$][A-Za-z0-9_$]*)")
        .expect("public class pattern is valid")
});

/// javac + java. The public class decides the file name, and the classpath
/// is the submission's own workspace.
#[derive(Debug, Clone)]
pub struct JavaAdapter {
    compiler: String,
    runtime: String,
}

impl JavaAdapter {
    pub fn new(compiler: impl Into<String>, runtime: impl Into<String>) -> Self {
        Self {
            compiler: compiler.into(),
            runtime: runtime.into(),
        }
    }
}

/// Name of the first public top-level class, `Main` when there is none
pub fn detect_class_name(code: &str) -> &str {
    PUBLIC_CLASS
        .captures(code)
        .and_then(|caps| caps.get(1))
        .map_or(DEFAULT_CLASS, |m| m.as_str())
}

fn class_name(workspace: &Workspace) -> String {
    workspace
        .source_path()
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_CLASS.to_string())
}

#[async_trait]
impl LanguageAdapter for JavaAdapter {
    fn language(&self) -> LanguageId {
        LanguageId::Java
    }

    fn source_file_name(&self, code: &str) -> String {
        format!("{}.java", detect_class_name(code))
    }

    fn compile_command(&self, workspace: &Workspace) -> Option<SandboxCommand> {
        Some(
            SandboxCommand::new(&self.compiler, workspace.path())
                .args(["-encoding", "UTF-8", "-d"])
                .arg(workspace.path())
                .arg(workspace.source_path())
                .address_space_limited(false),
        )
    }

    fn artifact_path(&self, workspace: &Workspace) -> PathBuf {
        workspace.join(format!("{}.class", class_name(workspace)))
    }

    fn run_command(
        &self,
        workspace: &Workspace,
        _artifact: &Path,
        limits: &ResourceLimits,
    ) -> SandboxCommand {
        SandboxCommand::new(&self.runtime, workspace.path())
            .arg(format!("-Xmx{}k", heap_kb(limits.memory_kb)))
            .args(["-Xss64m", "-XX:+UseSerialGC", "-Dfile.encoding=UTF-8", "-cp"])
            .arg(workspace.path())
            .arg(class_name(workspace))
            .address_space_limited(false)
    }
}

fn heap_kb(memory_kb: u64) -> u64 {
    (memory_kb.saturating_mul(HEAP_PERCENT) / 100).max(1)
}
