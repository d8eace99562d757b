//! Judge service
//!
//! Boundary of the engine: validates a [`JudgeRequest`], waits for a slot in
//! the global worker pool, judges under the submission deadline and reports
//! either a complete [`Submission`] or a judging-system failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{AppResult, JudgeError};
use crate::judge::{
    ExecutionSandbox, JudgeRunner, LanguageRegistry, ProcessRunner, WorkspaceManager,
};
use crate::metrics::{self, ACTIVE_SUBMISSIONS, GaugeGuard, QUEUED_SUBMISSIONS};
use crate::models::{JudgeRequest, ResourceLimits, Submission};
use crate::scoring::ScoringEngine;
use crate::utils::SubmissionRateLimiter;

/// Cheap to clone; clones share the worker pool and rate limiter
#[derive(Clone)]
pub struct JudgeService {
    inner: Arc<Inner>,
}

struct Inner {
    runner: JudgeRunner,
    pool: Semaphore,
    pool_size: usize,
    defaults: ResourceLimits,
    deadline: Duration,
    scoring: ScoringEngine,
    rate_limiter: SubmissionRateLimiter,
}

impl JudgeService {
    /// Service backed by the real sandbox and every built-in language.
    ///
    /// Does not check the host; when network isolation is configured but
    /// unavailable every execution fails to spawn. Prefer
    /// [`JudgeService::try_new`].
    pub fn new(config: &Config) -> Self {
        let sandbox = ExecutionSandbox::new(config.sandbox.clone());
        Self::with_sandbox(config, sandbox)
    }

    /// Like [`JudgeService::new`], rejecting an invalid configuration or a
    /// host that cannot provide the configured isolation
    pub fn try_new(config: &Config) -> AppResult<Self> {
        config.validate()?;
        let sandbox = ExecutionSandbox::try_new(config.sandbox.clone())?;
        Ok(Self::with_sandbox(config, sandbox))
    }

    fn with_sandbox(config: &Config, sandbox: ExecutionSandbox) -> Self {
        let registry = LanguageRegistry::with_defaults(&config.toolchains);
        Self::with_parts(config, registry, Arc::new(sandbox))
    }

    /// Service with a custom registry and process runner
    pub fn with_parts(
        config: &Config,
        registry: LanguageRegistry,
        process_runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        metrics::init_metrics();

        let runner = JudgeRunner::new(
            Arc::new(registry),
            WorkspaceManager::new(&config.judge.workspace_root),
            process_runner,
            &config.judge,
        );
        let pool_size = config.judge.max_concurrent_submissions.max(1);

        Self {
            inner: Arc::new(Inner {
                runner,
                pool: Semaphore::new(pool_size),
                pool_size,
                defaults: ResourceLimits {
                    wall_time_ms: config.judge.default_time_limit_ms,
                    memory_kb: config.judge.default_memory_limit_kb,
                },
                deadline: Duration::from_millis(config.judge.submission_deadline_ms),
                scoring: ScoringEngine::from_config(&config.scoring),
                rate_limiter: SubmissionRateLimiter::from_config(&config.rate_limit),
            }),
        }
    }

    /// Judge one request. Long-running; call from a background task.
    pub async fn judge(&self, request: JudgeRequest) -> AppResult<Submission> {
        self.judge_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Judge one request on behalf of `user_key`, subject to rate limiting
    pub async fn judge_for_user(
        &self,
        user_key: &str,
        request: JudgeRequest,
    ) -> AppResult<Submission> {
        if let Err(e) = self.inner.rate_limiter.check(user_key) {
            metrics::record_failure(e.error_code());
            return Err(e);
        }
        self.judge(request).await
    }

    /// Judge on the runtime; abort through `cancel`
    pub fn spawn(
        &self,
        request: JudgeRequest,
        cancel: CancellationToken,
    ) -> JoinHandle<AppResult<Submission>> {
        let service = self.clone();
        tokio::spawn(async move { service.judge_with_cancel(request, cancel).await })
    }

    /// Judge one request until it completes, `cancel` fires or the deadline
    /// passes. Cancellation and the deadline kill in-flight processes and
    /// remove the workspace before returning.
    pub async fn judge_with_cancel(
        &self,
        request: JudgeRequest,
        cancel: CancellationToken,
    ) -> AppResult<Submission> {
        let criteria = request.criteria;
        let source = match request.into_source(self.inner.defaults) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(error = %e, error_code = e.error_code(), "Rejected judge request");
                metrics::record_failure(e.error_code());
                return Err(e);
            }
        };

        let queued = GaugeGuard::new(&QUEUED_SUBMISSIONS);
        let _permit = tokio::select! {
            permit = self.inner.pool.acquire() => {
                permit.map_err(|_| anyhow::anyhow!("worker pool closed"))?
            }
            _ = cancel.cancelled() => {
                metrics::record_failure(JudgeError::Cancelled.error_code());
                return Err(JudgeError::Cancelled);
            }
        };
        drop(queued);
        let _active = GaugeGuard::new(&ACTIVE_SUBMISSIONS);

        let started = Instant::now();
        let outcome =
            match tokio::time::timeout(self.inner.deadline, self.inner.runner.judge(&source, &cancel))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(JudgeError::DeadlineExceeded(
                    self.inner.deadline.as_millis() as u64,
                )),
            };
        let elapsed = started.elapsed();

        match outcome {
            Ok(mut submission) => {
                if let Some(criteria) = criteria {
                    self.inner.scoring.apply(&mut submission, &criteria);
                }
                metrics::record_judged(
                    submission.language,
                    submission.status,
                    elapsed.as_secs_f64(),
                );
                tracing::info!(
                    submission_id = %submission.id,
                    language = %submission.language,
                    verdict = %submission.status,
                    passed = submission.passed_count(),
                    total = submission.total_count(),
                    runtime_ms = submission.runtime_ms,
                    memory_kb = submission.memory_kb,
                    score = submission.score,
                    duration_ms = elapsed.as_millis() as u64,
                    "Submission judged"
                );
                Ok(submission)
            }
            Err(e) => {
                metrics::record_failure(e.error_code());
                match e {
                    JudgeError::Cancelled | JudgeError::DeadlineExceeded(_) => tracing::warn!(
                        submission_id = %source.id,
                        error = %e,
                        error_code = e.error_code(),
                        "Judging aborted"
                    ),
                    _ => tracing::error!(
                        submission_id = %source.id,
                        language = %source.language,
                        error = ?e,
                        error_code = e.error_code(),
                        retryable = e.is_retryable(),
                        "Judging failed"
                    ),
                }
                Err(e)
            }
        }
    }

    /// Size of the global worker pool
    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    /// Free worker pool slots
    pub fn available_workers(&self) -> usize {
        self.inner.pool.available_permits()
    }

    /// Languages this service can judge
    pub fn languages(&self) -> Vec<crate::models::LanguageId> {
        self.inner.runner.registry().languages()
    }
}
