/// Result Aggregator - One Report per Submission
///
/// **Scoring Rules:**
/// - score = sum of points of passed checks
/// - max_score = sum of points of all checks
/// - success = safe AND no runtime error AND every check passed
///
/// **Output Rules:**
/// - Clean run: the captured output as-is
/// - Runtime error: `Error: {error}`
/// - Termination: partial output (if any), then `Error: {error}`
///
/// Pure function: never fails, never panics on any input.
use quest_common::types::{
    ExecutionOutcome, ExecutionReport, FailureKind, SafetyVerdict, TestCheck,
};

use crate::grader::SYNTAX_ERROR_CHECK;

pub const REJECTION_MESSAGE: &str = "Code contains potentially dangerous operations";

pub fn aggregate(
    verdict: &SafetyVerdict,
    outcome: ExecutionOutcome,
    checks: Vec<TestCheck>,
) -> ExecutionReport {
    if !verdict.safe {
        return reject(verdict);
    }

    let all_passed = checks.iter().all(|check| check.passed);
    let success = outcome.error.is_none() && all_passed;
    let score = checks.iter().filter(|c| c.passed).map(|c| c.points).sum();
    let max_score = checks.iter().map(|c| c.points).sum();

    // The interpreter also rejects unparsable code, so a syntax failure
    // normally arrives together with an error
    let failure_kind = match (&outcome.error, outcome.termination) {
        (Some(_), Some(termination)) => Some(FailureKind::from(termination)),
        _ if is_syntax_failure(&checks) => Some(FailureKind::SyntaxFailure),
        (Some(_), None) => Some(FailureKind::RuntimeFailure),
        (None, _) => None,
    };

    let output = match &outcome.error {
        None => outcome.captured_output,
        Some(error) if outcome.termination.is_some() && !outcome.captured_output.is_empty() => {
            let mut output = outcome.captured_output;
            if !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&format!("Error: {}", error));
            output
        }
        Some(error) => format!("Error: {}", error),
    };

    ExecutionReport {
        success,
        output,
        execution_time: outcome.elapsed_seconds.max(0.0),
        test_results: checks,
        score,
        max_score,
        failure_kind,
    }
}

/// Report for a safety violation; nothing else is consulted
pub fn reject(verdict: &SafetyVerdict) -> ExecutionReport {
    let output = match &verdict.violation {
        Some(pattern) => format!("{} (matched: {})", REJECTION_MESSAGE, pattern),
        None => REJECTION_MESSAGE.to_string(),
    };
    ExecutionReport::rejected(output, FailureKind::SafetyViolation)
}

/// Generic report for a fault of the engine itself
pub fn internal_failure(detail: impl std::fmt::Display) -> ExecutionReport {
    ExecutionReport::rejected(format!("Execution error: {}", detail), FailureKind::InternalFailure)
}

fn is_syntax_failure(checks: &[TestCheck]) -> bool {
    matches!(checks, [only] if only.description == SYNTAX_ERROR_CHECK && !only.passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quest_common::types::Termination;

    fn passing(points: u32) -> TestCheck {
        TestCheck::new("passing", true, points)
    }

    fn failing(points: u32) -> TestCheck {
        TestCheck::new("failing", false, points)
    }

    #[test]
    fn test_clean_run_all_pass() {
        let outcome = ExecutionOutcome::completed("Name: Ada\n".to_string(), 0.04);
        let report = aggregate(&SafetyVerdict::safe(), outcome, vec![passing(10), passing(40)]);

        assert!(report.success);
        assert_eq!(report.output, "Name: Ada\n");
        assert_eq!(report.execution_time, 0.04);
        assert_eq!(report.score, 50);
        assert_eq!(report.max_score, 50);
        assert_eq!(report.failure_kind, None);
    }

    #[test]
    fn test_failed_check_blocks_success() {
        let outcome = ExecutionOutcome::completed(String::new(), 0.01);
        let report = aggregate(&SafetyVerdict::safe(), outcome, vec![passing(10), failing(20)]);

        assert!(!report.success);
        assert_eq!(report.score, 10);
        assert_eq!(report.max_score, 30);
        assert_eq!(report.failure_kind, None);
    }

    #[test]
    fn test_runtime_error_formats_output() {
        let outcome = ExecutionOutcome::failed("ignored\n".to_string(), "division by zero", 0.02);
        let report = aggregate(&SafetyVerdict::safe(), outcome, vec![passing(50)]);

        assert!(!report.success);
        assert_eq!(report.output, "Error: division by zero");
        assert_eq!(report.failure_kind, Some(FailureKind::RuntimeFailure));
        // Grading is kept even though the code crashed
        assert_eq!(report.score, 50);
    }

    #[test]
    fn test_timeout_keeps_partial_output() {
        let mut outcome =
            ExecutionOutcome::failed("tick".to_string(), "Execution timed out after 10ms", 0.01);
        outcome.termination = Some(Termination::Timeout);

        let report = aggregate(&SafetyVerdict::safe(), outcome, vec![passing(50)]);

        assert_eq!(report.output, "tick\nError: Execution timed out after 10ms");
        assert_eq!(report.failure_kind, Some(FailureKind::Timeout));
    }

    #[test]
    fn test_unsafe_ignores_outcome_and_checks() {
        let verdict = SafetyVerdict::unsafe_because(r"import\s+os");
        let outcome = ExecutionOutcome::completed("should not appear".to_string(), 3.0);

        let report = aggregate(&verdict, outcome, vec![passing(50)]);

        assert!(!report.success);
        assert!(report.test_results.is_empty());
        assert_eq!(report.execution_time, 0.0);
        assert_eq!(
            report.output,
            r"Code contains potentially dangerous operations (matched: import\s+os)"
        );
        assert_eq!(report.failure_kind, Some(FailureKind::SafetyViolation));
    }

    #[test]
    fn test_syntax_failure_kind() {
        let outcome = ExecutionOutcome::completed(String::new(), 0.0);
        let checks = vec![TestCheck::new(SYNTAX_ERROR_CHECK, false, 0).with_message("bad")];

        let report = aggregate(&SafetyVerdict::safe(), outcome, checks);

        assert!(!report.success);
        assert_eq!(report.failure_kind, Some(FailureKind::SyntaxFailure));
    }

    #[test]
    fn test_syntax_failure_wins_over_compile_error() {
        let outcome = ExecutionOutcome::failed(
            String::new(),
            "invalid syntax (<submission>, line 1)",
            0.01,
        );
        let checks = vec![TestCheck::new(SYNTAX_ERROR_CHECK, false, 0).with_message("bad")];

        let report = aggregate(&SafetyVerdict::safe(), outcome, checks);

        assert_eq!(report.failure_kind, Some(FailureKind::SyntaxFailure));
        assert_eq!(report.output, "Error: invalid syntax (<submission>, line 1)");
    }

    #[test]
    fn test_termination_wins_over_syntax_failure() {
        let mut outcome = ExecutionOutcome::failed(String::new(), "Execution timed out after 5ms", 0.01);
        outcome.termination = Some(Termination::Timeout);
        let checks = vec![TestCheck::new(SYNTAX_ERROR_CHECK, false, 0)];

        let report = aggregate(&SafetyVerdict::safe(), outcome, checks);

        assert_eq!(report.failure_kind, Some(FailureKind::Timeout));
    }

    #[test]
    fn test_internal_failure_report() {
        let report = internal_failure("worker could not start");

        assert!(!report.success);
        assert_eq!(report.output, "Execution error: worker could not start");
        assert_eq!(report.execution_time, 0.0);
        assert!(report.test_results.is_empty());
        assert_eq!(report.failure_kind, Some(FailureKind::InternalFailure));
    }
}
