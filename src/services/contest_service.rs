//! Contest service
//!
//! Scores judged submissions and keeps one leaderboard per contest.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::models::{ContestParticipant, ScoringCriteria, Submission};
use crate::scoring::{Leaderboard, ScorePolicy, ScoringEngine};

/// In-memory contest standings
#[derive(Debug)]
pub struct ContestService {
    engine: ScoringEngine,
    policy: ScorePolicy,
    boards: Mutex<HashMap<Uuid, Arc<Leaderboard>>>,
}

impl ContestService {
    pub fn new(engine: ScoringEngine, policy: ScorePolicy) -> Self {
        Self {
            engine,
            policy,
            boards: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(ScoringEngine::from_config(config), ScorePolicy::default())
    }

    fn boards(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<Leaderboard>>> {
        self.boards.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Score without touching any leaderboard
    pub fn score_submission(&self, submission: &Submission, criteria: &ScoringCriteria) -> f64 {
        self.engine.score(submission, criteria)
    }

    /// Score `submission`, store the score on it and update the contest
    /// standings. Returns the standings after the update.
    pub fn record(
        &self,
        contest_id: Uuid,
        user_id: Uuid,
        submission: &mut Submission,
        criteria: &ScoringCriteria,
    ) -> Vec<ContestParticipant> {
        let score = self.engine.apply(submission, criteria);
        let board = self.leaderboard(contest_id);
        let changed = board.update_score(user_id, score, submission.judged_at, self.policy);

        tracing::debug!(
            %contest_id,
            %user_id,
            submission_id = %submission.id,
            score,
            changed,
            "Recorded contest submission"
        );
        board.standings()
    }

    /// Leaderboard of `contest_id`, created on first use
    pub fn leaderboard(&self, contest_id: Uuid) -> Arc<Leaderboard> {
        Arc::clone(self.boards().entry(contest_id).or_default())
    }

    /// Ranked participants; empty for an unknown contest
    pub fn standings(&self, contest_id: Uuid) -> Vec<ContestParticipant> {
        self.boards()
            .get(&contest_id)
            .map(|board| board.standings())
            .unwrap_or_default()
    }
}

impl Default for ContestService {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}
