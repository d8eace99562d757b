//! Contest leaderboard
//!
//! Ranks are never stored independently: every score change re-sorts all
//! participants (score descending, earlier `scored_at` first, stable) and
//! renumbers them under the same lock.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::ContestParticipant;

/// How a new score combines with the participant's current one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScorePolicy {
    /// The latest judged submission counts
    Latest,
    /// Only an improvement replaces the current score
    #[default]
    Best,
}

/// Participants of one contest, kept ranked
#[derive(Debug, Default)]
pub struct Leaderboard {
    participants: Mutex<Vec<ContestParticipant>>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn participants(&self) -> MutexGuard<'_, Vec<ContestParticipant>> {
        // The list is re-sorted on every write, so a poisoned guard still
        // holds a consistent ranking.
        self.participants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a score for `user_id` and re-rank everyone.
    ///
    /// Returns `true` when the participant's score changed.
    pub fn update_score(
        &self,
        user_id: Uuid,
        score: f64,
        scored_at: DateTime<Utc>,
        policy: ScorePolicy,
    ) -> bool {
        let mut participants = self.participants();

        let changed = match participants.iter_mut().find(|p| p.user_id == user_id) {
            Some(existing) => {
                let replace = match policy {
                    ScorePolicy::Latest => true,
                    ScorePolicy::Best => score > existing.score,
                };
                if replace {
                    existing.score = score;
                    existing.scored_at = scored_at;
                }
                replace
            }
            None => {
                participants.push(ContestParticipant::new(user_id, score, scored_at));
                true
            }
        };

        if changed {
            rerank(&mut participants);
        }
        changed
    }

    /// Remove a participant; the others are re-ranked
    pub fn remove(&self, user_id: Uuid) -> Option<ContestParticipant> {
        let mut participants = self.participants();
        let index = participants.iter().position(|p| p.user_id == user_id)?;
        let mut removed = participants.remove(index);
        removed.rank = None;
        rerank(&mut participants);
        Some(removed)
    }

    /// Snapshot of the ranked participants, best first
    pub fn standings(&self) -> Vec<ContestParticipant> {
        self.participants().clone()
    }

    pub fn participant(&self, user_id: Uuid) -> Option<ContestParticipant> {
        self.participants()
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.participants().len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants().is_empty()
    }
}

/// Stable sort by score descending then earlier time, and renumber from 1
fn rerank(participants: &mut [ContestParticipant]) {
    participants.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.scored_at.cmp(&b.scored_at))
    });
    for (position, participant) in participants.iter_mut().enumerate() {
        participant.rank = Some(position as u32 + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn ranks(board: &Leaderboard) -> Vec<(Uuid, u32)> {
        board
            .standings()
            .iter()
            .map(|p| (p.user_id, p.rank.unwrap()))
            .collect()
    }

    #[test]
    fn test_ranks_follow_scores() {
        let board = Leaderboard::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        board.update_score(a, 0.5, now, ScorePolicy::Best);
        board.update_score(b, 0.9, now, ScorePolicy::Best);
        board.update_score(c, 0.7, now, ScorePolicy::Best);
        assert_eq!(ranks(&board), vec![(b, 1), (c, 2), (a, 3)]);

        board.update_score(a, 1.0, now + Duration::seconds(1), ScorePolicy::Best);
        assert_eq!(ranks(&board), vec![(a, 1), (b, 2), (c, 3)]);
    }

    #[test]
    fn test_ties_go_to_the_earlier_score() {
        let board = Leaderboard::new();
        let (early, late) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        board.update_score(late, 0.8, now + Duration::seconds(5), ScorePolicy::Best);
        board.update_score(early, 0.8, now, ScorePolicy::Best);
        assert_eq!(ranks(&board), vec![(early, 1), (late, 2)]);
    }

    #[test]
    fn test_best_policy_ignores_regressions() {
        let board = Leaderboard::new();
        let user = Uuid::new_v4();
        let first = Utc::now();

        assert!(board.update_score(user, 0.8, first, ScorePolicy::Best));
        assert!(!board.update_score(user, 0.3, first + Duration::seconds(1), ScorePolicy::Best));
        assert!(!board.update_score(user, 0.8, first + Duration::seconds(2), ScorePolicy::Best));
        let participant = board.participant(user).unwrap();
        assert_eq!(participant.score, 0.8);
        assert_eq!(participant.scored_at, first);

        assert!(board.update_score(user, 0.3, first, ScorePolicy::Latest));
        assert_eq!(board.participant(user).unwrap().score, 0.3);
    }

    #[test]
    fn test_remove_reranks() {
        let board = Leaderboard::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        board.update_score(a, 0.9, now, ScorePolicy::Best);
        board.update_score(b, 0.1, now, ScorePolicy::Best);

        let removed = board.remove(a).unwrap();
        assert_eq!(removed.rank, None);
        assert_eq!(ranks(&board), vec![(b, 1)]);
        assert!(board.remove(a).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_keep_a_consistent_ranking() {
        let board = Arc::new(Leaderboard::new());
        let users: Vec<Uuid> = (0..32).map(|_| Uuid::new_v4()).collect();

        let mut handles = Vec::new();
        for (i, user) in users.iter().copied().enumerate() {
            let board = Arc::clone(&board);
            handles.push(tokio::spawn(async move {
                for step in 0..10 {
                    let score = (i * 10 + step) as f64 / 1000.0;
                    board.update_score(user, score, Utc::now(), ScorePolicy::Best);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let standings = board.standings();
        assert_eq!(standings.len(), users.len());
        for (position, participant) in standings.iter().enumerate() {
            assert_eq!(participant.rank, Some(position as u32 + 1));
        }
        assert!(standings.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(standings[0].user_id, users[31]);
    }
}
