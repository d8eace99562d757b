//! Prometheus metrics for the judging engine

use std::sync::{LazyLock, Once};

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::error::AppResult;
use crate::models::{LanguageId, VerdictKind};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static REGISTER: Once = Once::new();

/// Wall time from pool admission to verdict
pub static JUDGE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        "judge_submission_duration_seconds",
        "Time spent judging submissions",
    )
    .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);

    HistogramVec::new(opts, &["language"]).expect("Failed to create histogram")
});

/// Verdict counter by type
pub static VERDICT_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let opts = Opts::new("judge_verdict_total", "Total submission verdicts by type");
    IntCounterVec::new(opts, &["verdict"]).expect("Failed to create counter")
});

/// Submissions that produced a verdict
pub static SUBMISSIONS_JUDGED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("judge_submissions_total", "Total submissions judged")
        .expect("Failed to create counter")
});

/// Judging-system failures by error code
pub static JUDGE_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "judge_failures_total",
        "Submissions that could not be judged, by error code",
    );
    IntCounterVec::new(opts, &["error_code"]).expect("Failed to create counter")
});

/// Submissions holding a worker pool slot
pub static ACTIVE_SUBMISSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("judge_active_submissions", "Submissions currently being judged")
        .expect("Failed to create gauge")
});

/// Submissions waiting for a worker pool slot
pub static QUEUED_SUBMISSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("judge_queued_submissions", "Submissions waiting for a worker")
        .expect("Failed to create gauge")
});

/// Register all metrics; later calls are no-ops
pub fn init_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(JUDGE_DURATION.clone()),
            Box::new(VERDICT_TOTAL.clone()),
            Box::new(SUBMISSIONS_JUDGED.clone()),
            Box::new(JUDGE_FAILURES.clone()),
            Box::new(ACTIVE_SUBMISSIONS.clone()),
            Box::new(QUEUED_SUBMISSIONS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::warn!(error = %e, "Failed to register metric");
            }
        }
    });
}

/// Record a completed judgement
pub fn record_judged(language: LanguageId, verdict: VerdictKind, duration_secs: f64) {
    SUBMISSIONS_JUDGED.inc();
    VERDICT_TOTAL.with_label_values(&[verdict.as_str()]).inc();
    JUDGE_DURATION
        .with_label_values(&[language.as_str()])
        .observe(duration_secs);
}

/// Record a judging-system failure
pub fn record_failure(error_code: &str) {
    JUDGE_FAILURES.with_label_values(&[error_code]).inc();
}

/// Increments a gauge for as long as it lives
pub(crate) struct GaugeGuard(&'static IntGauge);

impl GaugeGuard {
    pub(crate) fn new(gauge: &'static IntGauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// Render every registered metric in the text exposition format
pub fn gather_text() -> AppResult<String> {
    init_metrics();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(anyhow::Error::from)?;
    String::from_utf8(buffer).map_err(|e| anyhow::Error::from(e).into())
}
