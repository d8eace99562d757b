//! Weighted score computation

use serde::Serialize;

use crate::config::ScoringConfig;
use crate::models::{ScoringCriteria, Submission};

/// Per-component contributions to a score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub accuracy: f64,
    pub time: f64,
    pub space: f64,
    pub quality: f64,
    pub total: f64,
}

/// Scores submissions against fixed normalization constants
#[derive(Debug, Clone, Copy)]
pub struct ScoringEngine {
    /// Runtime at which time credit reaches zero
    reference_time_ms: u64,
    /// Memory at which space credit reaches zero
    reference_memory_kb: u64,
}

impl ScoringEngine {
    pub fn new(reference_time_ms: u64, reference_memory_kb: u64) -> Self {
        Self {
            reference_time_ms: reference_time_ms.max(1),
            reference_memory_kb: reference_memory_kb.max(1),
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(config.reference_time_ms, config.reference_memory_kb)
    }

    /// Score in `[0, criteria.weight_sum()]`
    pub fn score(&self, submission: &Submission, criteria: &ScoringCriteria) -> f64 {
        self.breakdown(submission, criteria).total
    }

    /// Component scores.
    ///
    /// `accuracy = passed / total * accuracy_weight`,
    /// `time = time_weight * max(0, 1 - runtime / reference_time)`,
    /// `space = space_weight * max(0, 1 - memory / reference_memory)`,
    /// `quality = quality_weight` (no code analysis behind it).
    /// A submission without test results (compile error) scores zero.
    pub fn breakdown(&self, submission: &Submission, criteria: &ScoringCriteria) -> ScoreBreakdown {
        if !criteria.is_normalized() {
            tracing::warn!(
                weight_sum = criteria.weight_sum(),
                "Scoring weights do not sum to 1; scores are not comparable across contests"
            );
        }

        let total_count = submission.total_count();
        if total_count == 0 {
            return ScoreBreakdown {
                accuracy: 0.0,
                time: 0.0,
                space: 0.0,
                quality: 0.0,
                total: 0.0,
            };
        }

        let pass_ratio = submission.passed_count() as f64 / total_count as f64;
        let accuracy = pass_ratio * criteria.accuracy_weight;
        let time = criteria.time_weight
            * (1.0 - submission.runtime_ms as f64 / self.reference_time_ms as f64).max(0.0);
        let space = criteria.space_weight
            * (1.0 - submission.memory_kb as f64 / self.reference_memory_kb as f64).max(0.0);
        let quality = criteria.quality_weight;

        let total = (accuracy + time + space + quality).clamp(0.0, criteria.weight_sum().max(0.0));

        ScoreBreakdown {
            accuracy,
            time,
            space,
            quality,
            total,
        }
    }

    /// Compute the score and store it on the submission
    pub fn apply(&self, submission: &mut Submission, criteria: &ScoringCriteria) -> f64 {
        submission.score = self.score(submission, criteria);
        submission.score
    }
}
