//! Contest scoring models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::constants::WEIGHT_SUM_TOLERANCE;

/// Weights converting test outcomes and resource usage into a score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct ScoringCriteria {
    #[validate(range(min = 0.0, max = 1.0))]
    pub accuracy_weight: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub time_weight: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub space_weight: f64,
    /// Awarded as-is; there is no static analysis behind it
    #[validate(range(min = 0.0, max = 1.0))]
    pub quality_weight: f64,
}

impl Default for ScoringCriteria {
    fn default() -> Self {
        Self {
            accuracy_weight: 0.6,
            time_weight: 0.2,
            space_weight: 0.1,
            quality_weight: 0.1,
        }
    }
}

impl ScoringCriteria {
    pub fn weight_sum(&self) -> f64 {
        self.accuracy_weight + self.time_weight + self.space_weight + self.quality_weight
    }

    /// Scores are only comparable across contests when the weights sum to 1
    pub fn is_normalized(&self) -> bool {
        (self.weight_sum() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE
    }
}

/// One participant's standing in a contest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContestParticipant {
    pub user_id: Uuid,
    pub score: f64,
    /// Derived from a fresh sort, never set directly
    pub rank: Option<u32>,
    /// When `score` was first reached; breaks ties
    pub scored_at: DateTime<Utc>,
}

impl ContestParticipant {
    pub fn new(user_id: Uuid, score: f64, scored_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            score,
            rank: None,
            scored_at,
        }
    }
}
