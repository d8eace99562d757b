//! Test case and resource limit models

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppResult;

/// One input/expected-output pair supplied by the problem catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub is_hidden: bool,
    /// Overrides the submission-level wall time when set
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
    /// Overrides the submission-level memory limit when set
    #[serde(default)]
    pub memory_limit_kb: Option<u64>,
}

impl TestCase {
    /// Create a test case without per-test limit overrides
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            is_hidden: false,
            time_limit_ms: None,
            memory_limit_kb: None,
        }
    }

    /// Limits that apply to this test: per-test overrides win over `defaults`
    pub fn effective_limits(&self, defaults: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            wall_time_ms: self
                .time_limit_ms
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.wall_time_ms),
            memory_kb: self
                .memory_limit_kb
                .filter(|kb| *kb > 0)
                .unwrap_or(defaults.memory_kb),
        }
    }

    /// Get a preview of the input (truncated)
    pub fn input_preview(&self, max_len: usize) -> String {
        preview(&self.input, max_len)
    }

    /// Get a preview of the expected output (truncated)
    pub fn output_preview(&self, max_len: usize) -> String {
        preview(&self.expected_output, max_len)
    }
}

/// Truncate on a char boundary so multi-byte input never panics
fn preview(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Wall time and memory bounds for one process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ResourceLimits {
    #[validate(range(min = 1))]
    pub wall_time_ms: u64,
    #[validate(range(min = 1))]
    pub memory_kb: u64,
}

impl ResourceLimits {
    /// Create limits, rejecting zero values
    pub fn new(wall_time_ms: u64, memory_kb: u64) -> AppResult<Self> {
        let limits = Self {
            wall_time_ms,
            memory_kb,
        };
        limits.validate()?;
        Ok(limits)
    }

    /// Clamp to the engine-wide maxima
    pub fn capped(self, max_time_ms: u64, max_memory_kb: u64) -> Self {
        Self {
            wall_time_ms: self.wall_time_ms.min(max_time_ms),
            memory_kb: self.memory_kb.min(max_memory_kb),
        }
    }

    pub fn memory_bytes(&self) -> u64 {
        self.memory_kb.saturating_mul(1024)
    }
}
