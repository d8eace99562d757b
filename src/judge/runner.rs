//! Judging orchestrator
//!
//! Drives one submission through
//! `Staged -> Compiling -> {CompileFailed | Compiled} -> RunningTests(i) -> Aggregated`.
//! Test cases run in order; with `max_parallel_tests > 1` up to that many run
//! at once while results keep their order. The workspace is removed exactly
//! once whatever the outcome.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesOrdered;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::JudgeConfig;
use crate::constants::{LOG_PREVIEW_LEN, MAX_MEMORY_LIMIT_KB, MAX_TIME_LIMIT_MS};
use crate::error::AppResult;
use crate::judge::classifier::classify;
use crate::judge::languages::{LanguageAdapter, LanguageRegistry};
use crate::judge::sandbox::ProcessRunner;
use crate::judge::workspace::{Workspace, WorkspaceManager};
use crate::models::{ResourceLimits, SourceSubmission, Submission, TestCase, TestResult};

/// Orchestrator state, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgePhase {
    Staged,
    Compiling,
    CompileFailed,
    Compiled,
    RunningTests { index: usize },
    Aggregated,
}

impl std::fmt::Display for JudgePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Staged => write!(f, "staged"),
            Self::Compiling => write!(f, "compiling"),
            Self::CompileFailed => write!(f, "compile_failed"),
            Self::Compiled => write!(f, "compiled"),
            Self::RunningTests { index } => write!(f, "running_tests[{index}]"),
            Self::Aggregated => write!(f, "aggregated"),
        }
    }
}

/// Everything one test run needs from its submission
struct TestRun<'a> {
    submission: &'a SourceSubmission,
    adapter: &'a dyn LanguageAdapter,
    workspace: &'a Workspace,
    artifact: &'a Path,
    cancel: &'a CancellationToken,
}

/// Stages, compiles, runs and aggregates one submission at a time
pub struct JudgeRunner {
    registry: Arc<LanguageRegistry>,
    workspaces: WorkspaceManager,
    runner: Arc<dyn ProcessRunner>,
    compile_limits: ResourceLimits,
    stop_on_first_failure: bool,
    max_parallel_tests: usize,
}

impl JudgeRunner {
    pub fn new(
        registry: Arc<LanguageRegistry>,
        workspaces: WorkspaceManager,
        runner: Arc<dyn ProcessRunner>,
        config: &JudgeConfig,
    ) -> Self {
        Self {
            registry,
            workspaces,
            runner,
            compile_limits: ResourceLimits {
                wall_time_ms: config.compile_time_limit_ms,
                memory_kb: config.compile_memory_limit_kb,
            },
            stop_on_first_failure: config.stop_on_first_failure,
            max_parallel_tests: config.max_parallel_tests.max(1),
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Judge a validated submission.
    ///
    /// Returns a complete [`Submission`] for every outcome of the user's
    /// code; `Err` only for infrastructure failures and cancellation.
    pub async fn judge(
        &self,
        submission: &SourceSubmission,
        cancel: &CancellationToken,
    ) -> AppResult<Submission> {
        let adapter = self.registry.adapter_for(submission.language)?;
        let workspace = self
            .workspaces
            .stage(submission.id, adapter.as_ref(), &submission.code)
            .await?;
        enter(submission.id, JudgePhase::Staged);

        let outcome = self
            .judge_staged(submission, adapter.as_ref(), &workspace, cancel)
            .await;

        if let Err(e) = self.workspaces.cleanup(workspace).await {
            tracing::error!(
                submission_id = %submission.id,
                error = %e,
                error_code = e.error_code(),
                "Failed to remove submission workspace"
            );
        }

        outcome
    }

    async fn judge_staged(
        &self,
        submission: &SourceSubmission,
        adapter: &dyn LanguageAdapter,
        workspace: &Workspace,
        cancel: &CancellationToken,
    ) -> AppResult<Submission> {
        enter(submission.id, JudgePhase::Compiling);
        let compiled = adapter
            .compile(workspace, self.runner.as_ref(), &self.compile_limits, cancel)
            .await?;

        if !compiled.success {
            enter(submission.id, JudgePhase::CompileFailed);
            return Ok(Submission::compile_error(
                submission.id,
                submission.language,
                compiled.diagnostics,
            ));
        }
        enter(submission.id, JudgePhase::Compiled);

        let run = TestRun {
            submission,
            adapter,
            workspace,
            artifact: &compiled.artifact_path,
            cancel,
        };
        let results = self.run_tests(&run).await?;

        let judged = Submission::from_test_results(submission.id, submission.language, results);
        enter(submission.id, JudgePhase::Aggregated);
        Ok(judged)
    }

    /// Run every test case, or up to the first failure when configured.
    ///
    /// Futures are created lazily, so with a parallelism of one each test
    /// starts only after the previous one resolved, and stopping early never
    /// starts the remaining tests.
    async fn run_tests(&self, run: &TestRun<'_>) -> AppResult<Vec<TestResult>> {
        let test_cases = &run.submission.test_cases;
        let mut results = Vec::with_capacity(test_cases.len());

        let mut cases = test_cases.iter().enumerate();
        let mut in_flight = FuturesOrdered::new();

        loop {
            while in_flight.len() < self.max_parallel_tests {
                let Some((index, test_case)) = cases.next() else {
                    break;
                };
                in_flight.push_back(self.run_test(run, index, test_case));
            }
            let Some(result) = in_flight.next().await else {
                break;
            };

            let result = result?;
            let failed = !result.passed;
            results.push(result);
            if failed && self.stop_on_first_failure {
                tracing::debug!(
                    submission_id = %run.submission.id,
                    judged = results.len(),
                    total = test_cases.len(),
                    "Stopping at first failed test case"
                );
                break;
            }
        }

        Ok(results)
    }

    async fn run_test(
        &self,
        run: &TestRun<'_>,
        index: usize,
        test_case: &TestCase,
    ) -> AppResult<TestResult> {
        enter(run.submission.id, JudgePhase::RunningTests { index });

        let limits = test_case
            .effective_limits(&run.submission.limits)
            .capped(MAX_TIME_LIMIT_MS, MAX_MEMORY_LIMIT_KB);
        let input = run.workspace.write_input(index, &test_case.input).await?;

        let execution = run
            .adapter
            .run(
                run.workspace,
                run.artifact,
                input,
                self.runner.as_ref(),
                &limits,
                run.cancel,
            )
            .await?;
        let result = classify(&execution, test_case);

        tracing::debug!(
            submission_id = %run.submission.id,
            test_case = index,
            verdict = %result.verdict,
            time_ms = result.time_used_ms,
            memory_kb = result.memory_used_kb,
            "Test case judged"
        );
        if !result.passed && !test_case.is_hidden {
            tracing::debug!(
                submission_id = %run.submission.id,
                test_case = index,
                input = %test_case.input_preview(LOG_PREVIEW_LEN),
                expected = %test_case.output_preview(LOG_PREVIEW_LEN),
                "Test case failed"
            );
        }
        Ok(result)
    }
}

fn enter(submission_id: Uuid, phase: JudgePhase) {
    tracing::debug!(submission_id = %submission_id, phase = %phase, "Judge phase");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JudgeError;
    use crate::judge::languages::{cpp::CppAdapter, python::PythonAdapter};
    use crate::judge::sandbox::{ExecutionResult, MockProcessRunner};
    use crate::models::{LanguageId, VerdictKind};

    fn registry() -> Arc<LanguageRegistry> {
        let mut registry = LanguageRegistry::default();
        registry.register(Arc::new(PythonAdapter::new("python3")));
        registry.register(Arc::new(CppAdapter::new("g++")));
        Arc::new(registry)
    }

    fn judge_runner(
        root: &Path,
        mock: MockProcessRunner,
        configure: impl FnOnce(&mut JudgeConfig),
    ) -> JudgeRunner {
        let mut config = JudgeConfig::default();
        configure(&mut config);
        JudgeRunner::new(
            registry(),
            WorkspaceManager::new(root),
            Arc::new(mock),
            &config,
        )
    }

    fn submission(language: LanguageId, tests: &[(&str, &str)]) -> SourceSubmission {
        SourceSubmission {
            id: Uuid::new_v4(),
            code: "code".to_string(),
            language,
            test_cases: tests
                .iter()
                .map(|(input, expected)| TestCase::new(*input, *expected))
                .collect(),
            limits: ResourceLimits::new(1000, 65536).unwrap(),
        }
    }

    /// Echo the staged stdin file back as stdout
    fn echo(cmd: &crate::judge::sandbox::SandboxCommand) -> AppResult<ExecutionResult> {
        let input = cmd
            .stdin
            .as_ref()
            .map(|path| std::fs::read_to_string(path).unwrap())
            .unwrap_or_default();
        Ok(ExecutionResult {
            wall_time_ms: 10,
            peak_memory_kb: 100,
            ..ExecutionResult::exited(0, input)
        })
    }

    fn is_empty(root: &Path) -> bool {
        std::fs::read_dir(root).map(|mut d| d.next().is_none()).unwrap_or(true)
    }

    #[tokio::test]
    async fn test_interpreted_submission_is_accepted() {
        let root = tempfile::tempdir().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_execute()
            .times(1)
            .returning(|cmd, _, _| echo(cmd));

        let runner = judge_runner(root.path(), mock, |_| {});
        let judged = runner
            .judge(
                &submission(LanguageId::Python, &[("5", "5")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(judged.status, VerdictKind::Accepted);
        assert_eq!(judged.test_results.len(), 1);
        assert!(judged.test_results[0].passed);
        assert!(is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_compile_error_short_circuits() {
        let root = tempfile::tempdir().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_execute().times(1).returning(|_, _, _| {
            Ok(ExecutionResult {
                stderr: b"solution.cpp:1:5: error: expected ';'".to_vec(),
                exit_code: 1,
                ..ExecutionResult::default()
            })
        });

        let runner = judge_runner(root.path(), mock, |_| {});
        let judged = runner
            .judge(
                &submission(LanguageId::Cpp, &[("1", "1"), ("2", "2")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(judged.status, VerdictKind::CompileError);
        assert!(judged.test_results.is_empty());
        assert!(judged.compile_output.unwrap().contains("expected ';'"));
        assert!(is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_compile_uses_compile_limits() {
        let root = tempfile::tempdir().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_execute()
            .withf(|cmd, limits, _| {
                cmd.program.as_path() == Path::new("g++")
                    && limits.wall_time_ms == 7_000
                    && limits.memory_kb == 512 * 1024
            })
            .times(1)
            .returning(|_, _, _| Ok(ExecutionResult::exited(0, "")));
        mock.expect_execute()
            .withf(|cmd, limits, _| cmd.program.ends_with("solution") && limits.wall_time_ms == 1000)
            .times(1)
            .returning(|cmd, _, _| echo(cmd));

        let runner = judge_runner(root.path(), mock, |config| {
            config.compile_time_limit_ms = 7_000;
            config.compile_memory_limit_kb = 512 * 1024;
        });
        let judged = runner
            .judge(
                &submission(LanguageId::Cpp, &[("3", "3")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(judged.status, VerdictKind::Accepted);
    }

    #[tokio::test]
    async fn test_all_tests_run_and_worst_verdict_wins() {
        let root = tempfile::tempdir().unwrap();
        let mut mock = MockProcessRunner::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|cmd, _, _| echo(cmd));
        mock.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| {
                Ok(ExecutionResult {
                    timed_out: true,
                    wall_time_ms: 1050,
                    ..ExecutionResult::default()
                })
            });
        mock.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(ExecutionResult::exited(0, "wrong")));

        let runner = judge_runner(root.path(), mock, |_| {});
        let judged = runner
            .judge(
                &submission(LanguageId::Python, &[("1", "1"), ("2", "2"), ("3", "3")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(judged.status, VerdictKind::TimeLimitExceeded);
        let verdicts: Vec<_> = judged.test_results.iter().map(|r| r.verdict).collect();
        assert_eq!(
            verdicts,
            vec![
                VerdictKind::Accepted,
                VerdictKind::TimeLimitExceeded,
                VerdictKind::WrongAnswer
            ]
        );
        assert_eq!(judged.runtime_ms, 10 + 1050);
    }

    #[tokio::test]
    async fn test_one_pass_one_fail_is_wrong_answer() {
        let root = tempfile::tempdir().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_execute().times(2).returning(|cmd, _, _| echo(cmd));

        let runner = judge_runner(root.path(), mock, |_| {});
        let judged = runner
            .judge(
                &submission(LanguageId::Python, &[("1", "1"), ("2", "3")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(judged.status, VerdictKind::WrongAnswer);
        assert_eq!(judged.test_results.len(), 2);
        assert!(judged.test_results[0].passed);
        assert!(!judged.test_results[1].passed);
    }

    #[tokio::test]
    async fn test_stop_on_first_failure() {
        let root = tempfile::tempdir().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_execute().times(2).returning(|cmd, _, _| echo(cmd));

        let runner = judge_runner(root.path(), mock, |config| {
            config.stop_on_first_failure = true;
        });
        let judged = runner
            .judge(
                &submission(LanguageId::Python, &[("1", "1"), ("2", "x"), ("3", "3")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(judged.status, VerdictKind::WrongAnswer);
        assert_eq!(judged.test_results.len(), 2);
    }

    #[tokio::test]
    async fn test_parallel_mode_keeps_test_order() {
        let root = tempfile::tempdir().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_execute().times(4).returning(|cmd, _, _| echo(cmd));

        let runner = judge_runner(root.path(), mock, |config| {
            config.max_parallel_tests = 3;
        });
        let judged = runner
            .judge(
                &submission(
                    LanguageId::Python,
                    &[("a", "a"), ("b", "x"), ("c", "c"), ("d", "d")],
                ),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let outputs: Vec<_> = judged
            .test_results
            .iter()
            .map(|r| r.actual_output.as_str())
            .collect();
        assert_eq!(outputs, vec!["a", "b", "c", "d"]);
        assert_eq!(judged.passed_count(), 3);
    }

    #[tokio::test]
    async fn test_judging_runs_on_a_spawned_task() {
        let root = tempfile::tempdir().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_execute().times(3).returning(|cmd, _, _| echo(cmd));

        let runner = Arc::new(judge_runner(root.path(), mock, |config| {
            config.max_parallel_tests = 2;
        }));
        let source = submission(LanguageId::Python, &[("1", "1"), ("2", "2"), ("3", "3")]);
        let handle = tokio::spawn(async move {
            runner.judge(&source, &CancellationToken::new()).await
        });

        let judged = handle.await.unwrap().unwrap();
        assert_eq!(judged.status, VerdictKind::Accepted);
        assert_eq!(judged.passed_count(), 3);
        assert!(is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_infrastructure_error_propagates_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_execute().times(1).returning(|cmd, _, _| {
            Err(JudgeError::Spawn {
                program: cmd.display_program(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        });

        let runner = judge_runner(root.path(), mock, |_| {});
        let err = runner
            .judge(
                &submission(LanguageId::Python, &[("1", "1"), ("2", "2")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, JudgeError::Spawn { .. }));
        assert!(is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_unregistered_language_fails_before_staging() {
        let root = tempfile::tempdir().unwrap();
        let workspace_root = root.path().join("workspaces");
        let mut mock = MockProcessRunner::new();
        mock.expect_execute().never();

        let runner = judge_runner(&workspace_root, mock, |_| {});
        let err = runner
            .judge(
                &submission(LanguageId::Java, &[("1", "1")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, JudgeError::UnsupportedLanguage(_)));
        assert!(!workspace_root.exists());
    }

    #[tokio::test]
    async fn test_per_test_limits_override_submission_limits() {
        let root = tempfile::tempdir().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_execute()
            .withf(|_, limits, _| limits.wall_time_ms == 250 && limits.memory_kb == 65536)
            .times(1)
            .returning(|cmd, _, _| echo(cmd));

        let runner = judge_runner(root.path(), mock, |_| {});
        let mut source = submission(LanguageId::Python, &[("1", "1")]);
        source.test_cases[0].time_limit_ms = Some(250);
        let judged = runner
            .judge(&source, &CancellationToken::new())
            .await
            .unwrap();
        assert!(judged.is_accepted());
    }
}
