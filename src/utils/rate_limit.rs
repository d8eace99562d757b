//! Submission rate limiting
//!
//! Sliding window per user key. The timestamp queues live behind the
//! limiter's own mutex and never leave it. Keys whose window emptied are
//! dropped on the next check, so the map only holds recently active users.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::error::{AppResult, JudgeError};

/// At most `max_submissions` per key in any window of `window`
#[derive(Debug)]
pub struct SubmissionRateLimiter {
    max_submissions: usize,
    window: Duration,
    history: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SubmissionRateLimiter {
    /// `max_submissions == 0` disables limiting
    pub fn new(max_submissions: usize, window: Duration) -> Self {
        Self {
            max_submissions,
            window,
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_submissions, Duration::from_secs(config.window_secs))
    }

    fn history(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit one submission for `key` or reject it with the wait time
    pub fn check(&self, key: &str) -> AppResult<()> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> AppResult<()> {
        if self.max_submissions == 0 {
            return Ok(());
        }

        let mut history = self.history();
        sweep_idle(&mut history, now, self.window);
        let stamps = history.entry(key.to_string()).or_default();

        if stamps.len() >= self.max_submissions {
            let retry_after = stamps
                .front()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
                .unwrap_or(self.window);
            let retry_after_secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            tracing::debug!(key, retry_after_secs, "Submission rate limited");
            return Err(JudgeError::RateLimited { retry_after_secs });
        }

        stamps.push_back(now);
        Ok(())
    }

    /// Submissions `key` may still make in the current window
    pub fn remaining(&self, key: &str) -> usize {
        if self.max_submissions == 0 {
            return usize::MAX;
        }
        let mut history = self.history();
        let Some(stamps) = history.get_mut(key) else {
            return self.max_submissions;
        };
        expire(stamps, Instant::now(), self.window);
        let used = stamps.len();
        if used == 0 {
            history.remove(key);
        }
        self.max_submissions.saturating_sub(used)
    }
}

/// Drop every key with no submission left inside the window
fn sweep_idle(history: &mut HashMap<String, VecDeque<Instant>>, now: Instant, window: Duration) {
    history.retain(|_, stamps| {
        expire(stamps, now, window);
        !stamps.is_empty()
    });
}

fn expire(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while stamps
        .front()
        .is_some_and(|oldest| now.saturating_duration_since(*oldest) >= window)
    {
        stamps.pop_front();
    }
}
