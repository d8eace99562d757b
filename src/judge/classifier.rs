//! Verdict classification
//!
//! Pure functions: the same execution result and test case always produce the
//! same [`TestResult`].
//!
//! # Output comparison policy
//!
//! Actual and expected output are both normalized, then compared for exact
//! equality:
//!
//! 1. trailing whitespace (including `\r`) is removed from every line;
//! 2. one trailing newline at the end of the stream is removed.
//!
//! Leading whitespace, blank lines in the middle, and any second trailing
//! blank line are significant.
//!
//! Output cut off at the sandbox capture cap is never accepted: the dropped
//! tail was not compared, so a truncated stream is a wrong answer.

use crate::judge::sandbox::ExecutionResult;
use crate::models::{TestCase, TestResult, VerdictKind};

/// Classify one execution against its test case.
///
/// Priority: timeout, memory, non-zero exit, truncated output, then output
/// comparison.
pub fn classify(result: &ExecutionResult, test_case: &TestCase) -> TestResult {
    let actual_output = String::from_utf8_lossy(&result.stdout).into_owned();

    let verdict = if result.timed_out {
        VerdictKind::TimeLimitExceeded
    } else if result.memory_exceeded {
        VerdictKind::MemoryLimitExceeded
    } else if result.exit_code != 0 {
        VerdictKind::RuntimeError
    } else if result.stdout_truncated {
        VerdictKind::WrongAnswer
    } else if outputs_match(&actual_output, &test_case.expected_output) {
        VerdictKind::Accepted
    } else {
        VerdictKind::WrongAnswer
    };

    TestResult {
        input: test_case.input.clone(),
        expected_output: test_case.expected_output.clone(),
        actual_output,
        passed: verdict.is_accepted(),
        time_used_ms: result.wall_time_ms,
        memory_used_kb: result.peak_memory_kb,
        verdict,
        output_truncated: result.stdout_truncated,
        is_hidden: test_case.is_hidden,
    }
}

/// Compare under the normalization policy
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize_output(actual) == normalize_output(expected)
}

/// Apply the normalization policy to one output stream
pub fn normalize_output(output: &str) -> String {
    let mut normalized = output
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    if normalized.ends_with('\n') {
        normalized.pop();
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(exit_code: i32, stdout: &str) -> ExecutionResult {
        ExecutionResult {
            wall_time_ms: 12,
            peak_memory_kb: 2048,
            ..ExecutionResult::exited(exit_code, stdout)
        }
    }

    #[test]
    fn test_normalization_policy() {
        assert_eq!(normalize_output("5 \n"), "5");
        assert_eq!(normalize_output("1 2  \r\n3\t\r\n"), "1 2\n3");
        assert_eq!(normalize_output("  5"), "  5");
        assert_eq!(normalize_output("a\n\nb\n"), "a\n\nb");
        assert_eq!(normalize_output("5\n\n"), "5\n");
        assert_eq!(normalize_output(""), "");
    }

    #[test]
    fn test_trailing_space_is_accepted() {
        let tc = TestCase::new("", "5");
        let result = classify(&exec(0, "5 "), &tc);
        assert_eq!(result.verdict, VerdictKind::Accepted);
        assert!(result.passed);
        assert_eq!(result.actual_output, "5 ");
        assert_eq!(result.time_used_ms, 12);
        assert_eq!(result.memory_used_kb, 2048);
    }

    #[test]
    fn test_wrong_answer() {
        let tc = TestCase::new("", "5\n");
        let result = classify(&exec(0, "6\n"), &tc);
        assert_eq!(result.verdict, VerdictKind::WrongAnswer);
        assert!(!result.passed);

        let extra_line = classify(&exec(0, "5\n\n\n"), &tc);
        assert_eq!(extra_line.verdict, VerdictKind::WrongAnswer);
    }

    #[test]
    fn test_priority_order() {
        let tc = TestCase::new("", "5");
        let mut result = exec(1, "5");
        result.timed_out = true;
        result.memory_exceeded = true;
        assert_eq!(classify(&result, &tc).verdict, VerdictKind::TimeLimitExceeded);

        result.timed_out = false;
        assert_eq!(classify(&result, &tc).verdict, VerdictKind::MemoryLimitExceeded);

        result.memory_exceeded = false;
        assert_eq!(classify(&result, &tc).verdict, VerdictKind::RuntimeError);

        result.exit_code = 0;
        assert_eq!(classify(&result, &tc).verdict, VerdictKind::Accepted);
    }

    #[test]
    fn test_timeout_never_passes_even_with_correct_output() {
        let tc = TestCase::new("", "5");
        let mut result = exec(0, "5");
        result.timed_out = true;
        let classified = classify(&result, &tc);
        assert!(!classified.passed);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let mut tc = TestCase::new("in", "out");
        tc.is_hidden = true;
        let mut result = exec(0, "out");
        result.stdout_truncated = true;
        let first = classify(&result, &tc);
        assert_eq!(first, classify(&result, &tc));
        assert!(first.is_hidden);
        assert!(first.output_truncated);
    }

    #[test]
    fn test_truncated_output_is_never_accepted() {
        let expected = "a".repeat(100);
        let tc = TestCase::new("", expected.as_str());
        let mut result = exec(0, expected.as_str());
        result.stdout_truncated = true;

        let classified = classify(&result, &tc);
        assert_eq!(classified.verdict, VerdictKind::WrongAnswer);
        assert!(!classified.passed);
        assert!(classified.output_truncated);

        result.exit_code = 1;
        assert_eq!(classify(&result, &tc).verdict, VerdictKind::RuntimeError);
    }
}
