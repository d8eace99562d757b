//! Submission, verdict and judging request models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;

use super::{LanguageId, ResourceLimits, ScoringCriteria, TestCase};

/// Categorical outcome of one test case or a whole submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Accepted,
    WrongAnswer,
    CompileError,
    RuntimeError,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    InternalError,
}

impl VerdictKind {
    /// Get verdict as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::WrongAnswer => "wrong_answer",
            Self::CompileError => "compile_error",
            Self::RuntimeError => "runtime_error",
            Self::TimeLimitExceeded => "time_limit_exceeded",
            Self::MemoryLimitExceeded => "memory_limit_exceeded",
            Self::InternalError => "internal_error",
        }
    }

    /// Get short code for verdict
    pub fn code(&self) -> &'static str {
        match self {
            Self::Accepted => "AC",
            Self::WrongAnswer => "WA",
            Self::CompileError => "CE",
            Self::RuntimeError => "RE",
            Self::TimeLimitExceeded => "TLE",
            Self::MemoryLimitExceeded => "MLE",
            Self::InternalError => "IE",
        }
    }

    /// Aggregation rank: the submission status is the highest-ranked test verdict.
    ///
    /// `Accepted < WrongAnswer < RuntimeError < TimeLimitExceeded <
    /// MemoryLimitExceeded < CompileError < InternalError`
    pub fn severity(&self) -> u8 {
        match self {
            Self::Accepted => 0,
            Self::WrongAnswer => 1,
            Self::RuntimeError => 2,
            Self::TimeLimitExceeded => 3,
            Self::MemoryLimitExceeded => 4,
            Self::CompileError => 5,
            Self::InternalError => 6,
        }
    }

    /// Check if this verdict means the solution was accepted
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// The more severe of two verdicts
    pub fn worst(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one test case; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub passed: bool,
    pub time_used_ms: u64,
    pub memory_used_kb: u64,
    pub verdict: VerdictKind,
    /// Captured stdout hit the sandbox cap
    #[serde(default)]
    pub output_truncated: bool,
    #[serde(default)]
    pub is_hidden: bool,
}

impl TestResult {
    /// Copy with input/expected/actual blanked out for hidden tests
    pub fn redacted(&self) -> Self {
        if !self.is_hidden {
            return self.clone();
        }
        Self {
            input: String::new(),
            expected_output: String::new(),
            actual_output: String::new(),
            ..self.clone()
        }
    }
}

/// Aggregated judgement of one submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub language: LanguageId,
    pub status: VerdictKind,
    pub test_results: Vec<TestResult>,
    /// Sum of per-test wall times
    pub runtime_ms: u64,
    /// Sum of per-test peak memory
    pub memory_kb: u64,
    pub score: f64,
    /// Compiler diagnostics, present when compilation failed
    pub compile_output: Option<String>,
    pub judged_at: DateTime<Utc>,
}

impl Submission {
    /// Terminal result of a failed compilation: no tests were attempted
    pub fn compile_error(id: Uuid, language: LanguageId, diagnostics: String) -> Self {
        Self {
            id,
            language,
            status: VerdictKind::CompileError,
            test_results: Vec::new(),
            runtime_ms: 0,
            memory_kb: 0,
            score: 0.0,
            compile_output: Some(diagnostics),
            judged_at: Utc::now(),
        }
    }

    /// Create submission result from test case results
    pub fn from_test_results(id: Uuid, language: LanguageId, results: Vec<TestResult>) -> Self {
        let status = results
            .iter()
            .map(|r| r.verdict)
            .fold(VerdictKind::Accepted, VerdictKind::worst);
        let runtime_ms = results.iter().map(|r| r.time_used_ms).sum();
        let memory_kb = results.iter().map(|r| r.memory_used_kb).sum();

        Self {
            id,
            language,
            status,
            test_results: results,
            runtime_ms,
            memory_kb,
            score: 0.0,
            compile_output: None,
            judged_at: Utc::now(),
        }
    }

    pub fn passed_count(&self) -> usize {
        self.test_results.iter().filter(|r| r.passed).count()
    }

    pub fn total_count(&self) -> usize {
        self.test_results.len()
    }

    /// Check if this submission was accepted
    pub fn is_accepted(&self) -> bool {
        self.status.is_accepted()
    }

    /// Copy suitable for showing to the submitter
    pub fn redacted(&self) -> Self {
        Self {
            test_results: self.test_results.iter().map(TestResult::redacted).collect(),
            ..self.clone()
        }
    }
}

/// Everything needed to judge one submission, already validated
#[derive(Debug, Clone)]
pub struct SourceSubmission {
    pub id: Uuid,
    pub code: String,
    pub language: LanguageId,
    pub test_cases: Vec<TestCase>,
    pub limits: ResourceLimits,
}

/// Judging request as received from the submission collaborator
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JudgeRequest {
    #[validate(length(min = 1, max = 32))]
    pub language: String,
    #[validate(length(min = 1, max = 1048576))]
    pub code: String,
    #[validate(length(min = 1))]
    pub test_cases: Vec<TestCase>,
    /// Submission-level defaults; engine defaults apply when absent
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
    /// Contest scoring weights; the submission is scored when present
    #[serde(default)]
    pub criteria: Option<ScoringCriteria>,
}

impl JudgeRequest {
    /// Validate the request and resolve it against engine defaults.
    ///
    /// Fails before any workspace exists: unknown language, empty source,
    /// no test cases, or zero limits.
    pub fn into_source(self, defaults: ResourceLimits) -> AppResult<SourceSubmission> {
        self.validate()?;
        if let Some(limits) = &self.limits {
            limits.validate()?;
        }
        if let Some(criteria) = &self.criteria {
            criteria.validate()?;
        }
        let language = self.language.parse::<LanguageId>()?;

        Ok(SourceSubmission {
            id: Uuid::new_v4(),
            code: self.code,
            language,
            test_cases: self.test_cases,
            limits: self.limits.unwrap_or(defaults),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JudgeError;

    fn result(verdict: VerdictKind, time_used_ms: u64, memory_used_kb: u64) -> TestResult {
        TestResult {
            input: "in".to_string(),
            expected_output: "out".to_string(),
            actual_output: "out".to_string(),
            passed: verdict.is_accepted(),
            time_used_ms,
            memory_used_kb,
            verdict,
            output_truncated: false,
            is_hidden: false,
        }
    }

    #[test]
    fn test_severity_order() {
        let ordered = [
            VerdictKind::Accepted,
            VerdictKind::WrongAnswer,
            VerdictKind::RuntimeError,
            VerdictKind::TimeLimitExceeded,
            VerdictKind::MemoryLimitExceeded,
            VerdictKind::CompileError,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].severity() < pair[1].severity());
            assert_eq!(pair[0].worst(pair[1]), pair[1]);
        }
    }

    #[test]
    fn test_aggregate_takes_worst_and_sums_usage() {
        let submission = Submission::from_test_results(
            Uuid::new_v4(),
            LanguageId::Cpp,
            vec![
                result(VerdictKind::Accepted, 10, 100),
                result(VerdictKind::TimeLimitExceeded, 1000, 200),
                result(VerdictKind::WrongAnswer, 20, 300),
            ],
        );
        assert_eq!(submission.status, VerdictKind::TimeLimitExceeded);
        assert_eq!(submission.runtime_ms, 1030);
        assert_eq!(submission.memory_kb, 600);
        assert_eq!(submission.passed_count(), 1);
        assert_eq!(submission.total_count(), 3);
    }

    #[test]
    fn test_compile_error_has_no_results() {
        let submission =
            Submission::compile_error(Uuid::new_v4(), LanguageId::C, "error: x".to_string());
        assert_eq!(submission.status, VerdictKind::CompileError);
        assert!(submission.test_results.is_empty());
        assert_eq!(submission.compile_output.as_deref(), Some("error: x"));
    }

    #[test]
    fn test_redaction_only_touches_hidden_tests() {
        let mut hidden = result(VerdictKind::WrongAnswer, 1, 1);
        hidden.is_hidden = true;
        let submission = Submission::from_test_results(
            Uuid::new_v4(),
            LanguageId::Python,
            vec![result(VerdictKind::Accepted, 1, 1), hidden],
        );
        let redacted = submission.redacted();
        assert_eq!(redacted.test_results[0].input, "in");
        assert!(redacted.test_results[1].input.is_empty());
        assert_eq!(redacted.test_results[1].verdict, VerdictKind::WrongAnswer);
    }

    #[test]
    fn test_request_validation() {
        let defaults = ResourceLimits::new(2000, 65536).unwrap();
        let request = JudgeRequest {
            language: "py".to_string(),
            code: "print(input())".to_string(),
            test_cases: vec![TestCase::new("5", "5")],
            limits: None,
            criteria: None,
        };
        let source = request.clone().into_source(defaults).unwrap();
        assert_eq!(source.language, LanguageId::Python);
        assert_eq!(source.limits, defaults);

        let mut empty = request.clone();
        empty.test_cases.clear();
        assert!(matches!(
            empty.into_source(defaults),
            Err(JudgeError::Validation(_))
        ));

        let mut zero = request.clone();
        zero.limits = Some(ResourceLimits {
            wall_time_ms: 0,
            memory_kb: 1,
        });
        assert!(matches!(
            zero.into_source(defaults),
            Err(JudgeError::Validation(_))
        ));

        let mut unknown = request;
        unknown.language = "cobol".to_string();
        assert!(matches!(
            unknown.into_source(defaults),
            Err(JudgeError::UnsupportedLanguage(_))
        ));
    }
}
