//! Contest scoring
//!
//! Converts judged submissions into comparable scores and derives ranks.

pub mod engine;
pub mod leaderboard;

pub use engine::{ScoreBreakdown, ScoringEngine};
pub use leaderboard::{Leaderboard, ScorePolicy};
